//! DIMSE message framing.
//!
//! Converts DIMSE command/data-set primitives to and from sequences of
//! P-DATA-TF PDUs sent through a [`DulProvider`](crate::dul::DulProvider).
//! The command set is always implicit-VR little-endian, independent of the
//! negotiated transfer syntax, which applies only to the data set.

use dicom_dictionary_std::tags;
use dicom_encoding::TransferSyntax;
use dicom_object::{InMemDicomObject, ReadError};
use dicom_transfer_syntax_registry::entries;
use snafu::{ResultExt, Snafu};

use crate::dul::{DulProvider, FromProvider, ToProvider};
use crate::pdu::{PDataValue, PDataValueType};

fn implicit_vr_le() -> TransferSyntax {
    entries::IMPLICIT_VR_LITTLE_ENDIAN.erased()
}

/// A decoded DIMSE message: a command set plus an optional accompanying
/// data set, still encoded in the presentation context's transfer syntax.
#[derive(Debug, Clone)]
pub struct DimseMessage {
    pub presentation_context_id: u8,
    pub command_field: u16,
    pub command: InMemDicomObject,
    pub data_set: Option<Vec<u8>>,
}

impl DimseMessage {
    pub fn message_id(&self) -> Option<u16> {
        self.command
            .get(tags::MESSAGE_ID)
            .and_then(|e| e.value().to_int().ok())
    }

    pub fn message_id_being_responded_to(&self) -> Option<u16> {
        self.command
            .get(tags::MESSAGE_ID_BEING_RESPONDED_TO)
            .and_then(|e| e.value().to_int().ok())
    }

    pub fn status(&self) -> Option<u16> {
        self.command
            .get(tags::STATUS)
            .and_then(|e| e.value().to_int().ok())
    }
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("the DUL provider is no longer running"))]
    ProviderStopped,
    #[snafu(display("the association ended before the message completed"))]
    AssociationEnded,
    #[snafu(display("the peer requested release before the message completed"))]
    Released,
    #[snafu(display("could not decode command set: {}", source))]
    DecodeCommand { source: ReadError },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<crate::dul::Error> for Error {
    fn from(_: crate::dul::Error) -> Self {
        Error::ProviderStopped
    }
}

/// The largest payload a single PDV can carry within one P-DATA-TF PDU
/// bounded by `max_pdu_length`: 4-byte PDV length, 1-byte context id,
/// 1-byte control header.
fn max_fragment_len(max_pdu_length: u32) -> usize {
    (max_pdu_length as usize).saturating_sub(6).max(1)
}

/// Stream a command set (and optional data set) to the peer as one or more
/// P-DATA-TF PDUs, fragmented to fit `max_pdu_length`.
///
/// Each PDV is sent as soon as it is built, so the peer may start decoding
/// before the whole message has left the wire.
pub fn send_message(
    dul: &DulProvider,
    presentation_context_id: u8,
    command_bytes: &[u8],
    data_set: Option<&[u8]>,
    max_pdu_length: u32,
) -> Result<()> {
    let max_len = max_fragment_len(max_pdu_length);
    send_fragments(
        dul,
        presentation_context_id,
        command_bytes,
        max_len,
        PDataValueType::Command,
    )?;
    if let Some(data_set) = data_set {
        send_fragments(
            dul,
            presentation_context_id,
            data_set,
            max_len,
            PDataValueType::Data,
        )?;
    }
    Ok(())
}

fn send_fragments(
    dul: &DulProvider,
    presentation_context_id: u8,
    bytes: &[u8],
    max_len: usize,
    value_type: PDataValueType,
) -> Result<()> {
    let chunks: Vec<&[u8]> = if bytes.is_empty() {
        vec![&bytes[..]]
    } else {
        bytes.chunks(max_len).collect()
    };
    let last = chunks.len() - 1;
    for (i, chunk) in chunks.into_iter().enumerate() {
        dul.send(ToProvider::PData(vec![PDataValue {
            presentation_context_id,
            value_type,
            is_last: i == last,
            data: chunk.to_vec(),
        }]))?;
    }
    Ok(())
}

/// Block until a complete DIMSE message (command set plus any accompanying
/// data set) has been reassembled from incoming P-DATA-TF PDUs.
pub fn receive_message(dul: &DulProvider) -> Result<DimseMessage> {
    let mut command_bytes = Vec::new();
    let mut data_bytes = Vec::new();
    let mut have_data_set = false;
    let mut presentation_context_id = 0u8;
    let mut command: Option<InMemDicomObject> = None;
    let mut data_set_type = 0x0101u16;
    let mut data_complete = false;

    loop {
        if command.is_some() && (data_set_type == 0x0101 || data_complete) {
            break;
        }

        match dul.receive()? {
            FromProvider::PData(pdvs) => {
                for pdv in pdvs {
                    presentation_context_id = pdv.presentation_context_id;
                    match pdv.value_type {
                        PDataValueType::Command => {
                            command_bytes.extend_from_slice(&pdv.data);
                            if pdv.is_last {
                                let decoded = InMemDicomObject::read_dataset_with_ts(
                                    &command_bytes[..],
                                    &implicit_vr_le(),
                                )
                                .context(DecodeCommandSnafu)?;
                                data_set_type = decoded
                                    .get(tags::COMMAND_DATA_SET_TYPE)
                                    .and_then(|e| e.value().to_int().ok())
                                    .unwrap_or(0x0101);
                                command = Some(decoded);
                            }
                        }
                        PDataValueType::Data => {
                            have_data_set = true;
                            data_bytes.extend_from_slice(&pdv.data);
                            if pdv.is_last {
                                data_complete = true;
                            }
                        }
                    }
                }
            }
            FromProvider::ReleaseIndication => return ReleasedSnafu.fail(),
            FromProvider::ReleaseConfirm | FromProvider::AbortIndication(_) => {
                return AssociationEndedSnafu.fail()
            }
            _ => {}
        }
    }

    let command = command.expect("loop exits only once the command set is decoded");
    let command_field = command
        .get(tags::COMMAND_FIELD)
        .and_then(|e| e.value().to_int().ok())
        .unwrap_or_default();

    Ok(DimseMessage {
        presentation_context_id,
        command_field,
        command,
        data_set: if have_data_set { Some(data_bytes) } else { None },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_lengths_respect_max_pdu() {
        let max_len = max_fragment_len(16);
        assert_eq!(max_len, 10);
        let bytes = vec![0u8; 25];
        let chunks: Vec<&[u8]> = bytes.chunks(max_len).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[2].len(), 5);
    }
}
