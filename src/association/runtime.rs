//! Association runtime: per-association DIMSE dispatch after ACSE
//! negotiation has produced an established [`Association`].
//!
//! On the acceptor side, [`serve`] loops over incoming DIMSE requests,
//! resolving each to its negotiated presentation context and forwarding it
//! to a registered [`SopClassHandler`]. The predecessor implementation's
//! attribute-based dynamic dispatch (resolving an operation object by
//! evaluating the SOP class name at runtime) is replaced here by an
//! explicit lookup in a [`HandlerRegistry`].
//!
//! On the requestor side, [`scu_request`] and [`scu_exchange`] expose the
//! two response shapes DIMSE services come in: exactly one response
//! (C-ECHO, C-STORE), or a run of pending responses terminated by a
//! non-pending status (C-FIND, C-GET, C-MOVE).

use std::collections::HashMap;
use std::sync::Arc;

use snafu::Snafu;

use crate::association::{acse, Association};
use crate::dimse::{self, DimseMessage};
use crate::dul::ToProvider;

/// Status code carried by intermediate C-FIND/C-GET/C-MOVE responses.
pub const STATUS_PENDING: u16 = 0xff00;
/// Status code for a successfully completed operation.
pub const STATUS_SUCCESS: u16 = 0x0000;

/// One DIMSE response a handler produces, ready for [`dimse::send_message`].
#[derive(Debug, Clone)]
pub struct DimseResponse {
    pub command_bytes: Vec<u8>,
    pub data_set: Option<Vec<u8>>,
}

/// Handles incoming DIMSE requests for one SOP class, on the acceptor
/// side.
pub trait SopClassHandler: Send + Sync {
    /// Handle one request, returning the responses to send in order: a
    /// single response for C-ECHO/C-STORE, or a run of 0xFF00 pending
    /// responses followed by a terminal status for C-FIND/C-GET/C-MOVE.
    fn scp(&self, association: &Association, request: &DimseMessage) -> Vec<DimseResponse>;
}

/// SOP-class UID -> handler. Populated by the owning [`crate::ae::AE`]
/// before the acceptor loop spawns an association's thread.
pub type HandlerRegistry = HashMap<String, Arc<dyn SopClassHandler>>;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("DIMSE framing error: {}", source))]
    Dimse { source: dimse::Error },
    #[snafu(display("no presentation context negotiated with id {}", id))]
    UnknownPresentationContext { id: u8 },
    #[snafu(display("no handler registered for SOP class {}", uid))]
    NoHandler { uid: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<dimse::Error> for Error {
    fn from(source: dimse::Error) -> Self {
        Error::Dimse { source }
    }
}

impl From<crate::dul::Error> for Error {
    fn from(source: crate::dul::Error) -> Self {
        Error::Dimse {
            source: source.into(),
        }
    }
}

/// Run the acceptor-side dispatch loop until the peer releases, aborts, or
/// a framing error occurs.
pub fn serve(association: &Association, registry: &HandlerRegistry) -> Result<()> {
    loop {
        if acse::check_release(association.dul()).unwrap_or(false) {
            return Ok(());
        }
        if acse::check_abort(association.dul()).unwrap_or(false) {
            return Ok(());
        }

        let request = match dimse::receive_message(association.dul()) {
            Ok(message) => message,
            Err(dimse::Error::Released) => {
                association.dul().send(ToProvider::ReleaseResponse)?;
                return Ok(());
            }
            Err(dimse::Error::AssociationEnded) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let context = association
            .context_by_id(request.presentation_context_id)
            .ok_or(Error::UnknownPresentationContext {
                id: request.presentation_context_id,
            })?;

        let handler =
            registry
                .get(&context.abstract_syntax)
                .ok_or_else(|| Error::NoHandler {
                    uid: context.abstract_syntax.clone(),
                })?;

        for response in handler.scp(association, &request) {
            dimse::send_message(
                association.dul(),
                request.presentation_context_id,
                &response.command_bytes,
                response.data_set.as_deref(),
                association.max_pdu_length(),
            )?;
        }
    }
}

/// Send a request and wait for exactly one response. Used by C-ECHO and
/// C-STORE, whose RSP always carries a terminal status.
pub fn scu_request(
    association: &Association,
    presentation_context_id: u8,
    command_bytes: &[u8],
    data_set: Option<&[u8]>,
) -> Result<DimseMessage> {
    dimse::send_message(
        association.dul(),
        presentation_context_id,
        command_bytes,
        data_set,
        association.max_pdu_length(),
    )?;
    Ok(dimse::receive_message(association.dul())?)
}

/// Send a request and collect responses until a non-pending status
/// arrives. Used by C-FIND, C-GET and C-MOVE.
pub fn scu_exchange(
    association: &Association,
    presentation_context_id: u8,
    command_bytes: &[u8],
    data_set: Option<&[u8]>,
) -> Result<Vec<DimseMessage>> {
    dimse::send_message(
        association.dul(),
        presentation_context_id,
        command_bytes,
        data_set,
        association.max_pdu_length(),
    )?;

    let mut responses = Vec::new();
    loop {
        let response = dimse::receive_message(association.dul())?;
        let pending = response.status().unwrap_or(STATUS_SUCCESS) == STATUS_PENDING;
        responses.push(response);
        if !pending {
            break;
        }
    }
    Ok(responses)
}
