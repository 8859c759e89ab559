//! ACSE: association control service element.
//!
//! Thin, stateless helpers over [`DulProvider`] that translate
//! association-control primitives into DUL primitives and back: building
//! and sending an A-ASSOCIATE-RQ, waiting for its outcome, negotiating
//! presentation contexts on the acceptor side, and releasing/aborting.

use std::time::Duration;

use snafu::Snafu;

use crate::association::scp::is_supported;
use crate::association::{Association, NegotiatedPresentationContext, ServiceClassRole};
use crate::dul::{AssociateResult, DulProvider, FromProvider, ToProvider};
use crate::pdu::{
    AbortRQSource, AssociationAC, AssociationRJ, AssociationRQ, PresentationContextProposed,
    PresentationContextResult, PresentationContextResultReason, UserVariableItem,
};

/// The standard's application context name, the only one this stack speaks.
pub const APPLICATION_CONTEXT_NAME: &str = "1.2.840.10008.3.1.1.1";

/// A presentation context this node is willing to propose as a requestor.
#[derive(Debug, Clone)]
pub struct ProposedContext {
    pub abstract_syntax: String,
    pub transfer_syntaxes: Vec<String>,
}

/// A presentation context this node is willing to accept as an acceptor,
/// with transfer syntaxes listed in order of preference.
#[derive(Debug, Clone)]
pub struct AcceptableContext {
    pub abstract_syntax: String,
    pub transfer_syntaxes: Vec<String>,
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("the DUL provider is no longer running"))]
    ProviderStopped,
    #[snafu(display("timed out waiting for a response"))]
    TimedOut,
    #[snafu(display("received an unexpected primitive while waiting for {expected}"))]
    UnexpectedPrimitive { expected: &'static str },
    #[snafu(display("the peer aborted instead of confirming the release"))]
    AbortedDuringRelease,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<crate::dul::Error> for Error {
    fn from(_: crate::dul::Error) -> Self {
        Error::ProviderStopped
    }
}

/// Assign ids 1, 3, 5, ... to a list of proposed contexts, as required by
/// the wire format (presentation context ids are odd).
fn build_presentation_context_proposals(
    contexts: &[ProposedContext],
) -> Vec<PresentationContextProposed> {
    contexts
        .iter()
        .enumerate()
        .map(|(i, c)| PresentationContextProposed {
            id: (i as u8) * 2 + 1,
            abstract_syntax: c.abstract_syntax.clone(),
            transfer_syntaxes: c.transfer_syntaxes.clone(),
        })
        .collect()
}

/// Build the A-ASSOCIATE-RQ a requestor sends to open an association.
/// The PDU is handed to [`DulProvider::for_requestor`]; the DUL sends it
/// the moment the transport connection is established.
pub fn build_request(
    calling_ae_title: &str,
    called_ae_title: &str,
    max_pdu_length: u32,
    implementation_class_uid: &str,
    implementation_version_name: &str,
    proposed_contexts: &[ProposedContext],
    mut user_sub_items: Vec<UserVariableItem>,
) -> AssociationRQ {
    let mut user_variables = vec![
        UserVariableItem::MaxLength(max_pdu_length),
        UserVariableItem::ImplementationClassUID(implementation_class_uid.to_string()),
        UserVariableItem::ImplementationVersionName(implementation_version_name.to_string()),
    ];
    user_variables.append(&mut user_sub_items);

    AssociationRQ {
        protocol_version: 1,
        calling_ae_title: calling_ae_title.to_string(),
        called_ae_title: called_ae_title.to_string(),
        application_context_name: APPLICATION_CONTEXT_NAME.to_string(),
        presentation_contexts: build_presentation_context_proposals(proposed_contexts),
        user_variables,
    }
}

/// The outcome of an association request.
pub enum RequestOutcome {
    Accepted(Association),
    Rejected(AssociationRJ),
    Aborted(AbortRQSource),
}

/// Block until the DUL reports the outcome of a previously-sent
/// A-ASSOCIATE-RQ, returning an established [`Association`] on acceptance.
pub fn await_response(
    dul: DulProvider,
    own_ae_title: String,
    called_ae_title: String,
    sent_contexts: &[PresentationContextProposed],
) -> Result<RequestOutcome> {
    match dul.receive()? {
        FromProvider::AssociateConfirmAccept(ac) => {
            let max_pdu_length = negotiated_max_pdu_length(&ac);
            let presentation_contexts = zip_accepted_contexts(sent_contexts, &ac);
            let association = Association::new(
                dul,
                ServiceClassRole::Scu,
                own_ae_title,
                called_ae_title,
                max_pdu_length,
                presentation_contexts,
            );
            Ok(RequestOutcome::Accepted(association))
        }
        FromProvider::AssociateConfirmReject(rj) => Ok(RequestOutcome::Rejected(rj)),
        FromProvider::AbortIndication(source) => Ok(RequestOutcome::Aborted(source)),
        _ => UnexpectedPrimitiveSnafu {
            expected: "A-ASSOCIATE confirmation",
        }
        .fail(),
    }
}

fn negotiated_max_pdu_length(ac: &AssociationAC) -> u32 {
    ac.user_variables
        .iter()
        .find_map(|v| match v {
            UserVariableItem::MaxLength(n) => Some(*n),
            _ => None,
        })
        .unwrap_or(16_000)
}

/// Zip the contexts this node proposed with the per-context results the
/// peer returned, by id, keeping only those accepted.
fn zip_accepted_contexts(
    sent: &[PresentationContextProposed],
    ac: &AssociationAC,
) -> Vec<NegotiatedPresentationContext> {
    ac.presentation_contexts
        .iter()
        .filter(|r| r.reason == PresentationContextResultReason::Acceptance)
        .filter_map(|r| {
            sent.iter()
                .find(|p| p.id == r.id)
                .map(|p| NegotiatedPresentationContext {
                    id: r.id,
                    abstract_syntax: p.abstract_syntax.clone(),
                    transfer_syntax: r.transfer_syntax.clone(),
                })
        })
        .collect()
}

/// Negotiate presentation contexts for an incoming A-ASSOCIATE-RQ already
/// indicated by the DUL (acceptance at the DUL/access-control level has
/// already happened; this only resolves each proposed context and sends
/// the A-ASSOCIATE-AC).
pub fn accept(
    dul: DulProvider,
    request: &AssociationRQ,
    own_ae_title: String,
    max_pdu_length: u32,
    implementation_class_uid: &str,
    implementation_version_name: &str,
    acceptable_contexts: &[AcceptableContext],
) -> Result<Association> {
    let mut results = Vec::with_capacity(request.presentation_contexts.len());
    let mut negotiated = Vec::new();

    for proposed in &request.presentation_contexts {
        match acceptable_contexts
            .iter()
            .find(|a| a.abstract_syntax == proposed.abstract_syntax)
        {
            Some(acceptable) => {
                let chosen = proposed.transfer_syntaxes.iter().find(|ts| {
                    acceptable.transfer_syntaxes.iter().any(|a| a == *ts) && is_supported(ts)
                });
                match chosen {
                    Some(ts) => {
                        results.push(PresentationContextResult {
                            id: proposed.id,
                            reason: PresentationContextResultReason::Acceptance,
                            transfer_syntax: ts.clone(),
                        });
                        negotiated.push(NegotiatedPresentationContext {
                            id: proposed.id,
                            abstract_syntax: proposed.abstract_syntax.clone(),
                            transfer_syntax: ts.clone(),
                        });
                    }
                    None => results.push(PresentationContextResult {
                        id: proposed.id,
                        reason: PresentationContextResultReason::TransferSyntaxesNotSupported,
                        transfer_syntax: String::new(),
                    }),
                }
            }
            None => results.push(PresentationContextResult {
                id: proposed.id,
                reason: PresentationContextResultReason::AbstractSyntaxNotSupported,
                transfer_syntax: String::new(),
            }),
        }
    }

    let ac = AssociationAC {
        protocol_version: request.protocol_version,
        calling_ae_title: request.calling_ae_title.clone(),
        called_ae_title: request.called_ae_title.clone(),
        application_context_name: request.application_context_name.clone(),
        presentation_contexts: results,
        user_variables: vec![
            UserVariableItem::MaxLength(max_pdu_length),
            UserVariableItem::ImplementationClassUID(implementation_class_uid.to_string()),
            UserVariableItem::ImplementationVersionName(implementation_version_name.to_string()),
        ],
    };

    let peer_ae_title = request.calling_ae_title.clone();
    dul.send(ToProvider::AssociateResponse(AssociateResult::Accept(ac)))?;

    Ok(Association::new(
        dul,
        ServiceClassRole::Scp,
        own_ae_title,
        peer_ae_title,
        max_pdu_length,
        negotiated,
    ))
}

/// Send an A-ASSOCIATE-RJ in answer to an indicated request, without ever
/// forming an [`Association`].
pub fn reject(dul: &DulProvider, rj: AssociationRJ) -> Result<()> {
    dul.send(ToProvider::AssociateResponse(AssociateResult::Reject(rj)))?;
    Ok(())
}

/// Request release of the association and wait for confirmation.
pub fn release(dul: &DulProvider) -> Result<()> {
    dul.send(ToProvider::ReleaseRequest)?;
    match dul.receive()? {
        FromProvider::ReleaseConfirm => Ok(()),
        FromProvider::AbortIndication(_) => AbortedDuringReleaseSnafu.fail(),
        _ => UnexpectedPrimitiveSnafu {
            expected: "A-RELEASE confirmation",
        }
        .fail(),
    }
}

/// Signal an A-ABORT. Does not wait for the connection to close.
pub fn abort(dul: &DulProvider) -> Result<()> {
    dul.send(ToProvider::AbortRequest)?;
    Ok(())
}

/// Non-destructively check for a peer-initiated release request; if one is
/// pending, consume it, confirm it, and return `true`.
pub fn check_release(dul: &DulProvider) -> Result<bool> {
    match dul.peek()? {
        Some(FromProvider::ReleaseIndication) => {
            dul.receive()?;
            dul.send(ToProvider::ReleaseResponse)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Non-destructively check for a peer-initiated (or provider-initiated)
/// abort; if one is pending, consume it and return `true`.
pub fn check_abort(dul: &DulProvider) -> Result<bool> {
    match dul.peek()? {
        Some(FromProvider::AbortIndication(_)) => {
            dul.receive()?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Block up to `timeout` for the DUL to report the outcome of a release or
/// abort; returns `Ok(None)` on timeout rather than blocking indefinitely.
pub fn wait_for_termination(
    dul: &DulProvider,
    timeout: Duration,
) -> Result<Option<FromProvider>> {
    Ok(dul.receive_timeout(timeout)?)
}
