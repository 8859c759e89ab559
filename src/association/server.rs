//! Association acceptor module.
//!
//! [`ServerAssociationOptions`] is the acceptor-side counterpart of
//! [`super::client::ClientAssociationOptions`]: reusable configuration for
//! negotiating an association out of an already-accepted [`TcpStream`].
//! Unlike the client options, a value of this type is meant to be reused
//! across many incoming connections.

use std::borrow::Cow;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use snafu::{ensure, ResultExt, Snafu};

use crate::association::acse::{self, AcceptableContext};
use crate::association::Association;
use crate::association::uid::trim_uid;
use crate::dul::{AcceptAny, AcceptCalledAeTitle, AccessControl, DulProvider, FromProvider};
use crate::pdu::DEFAULT_MAX_PDU;
use crate::{IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME};

const DEFAULT_ARTIM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// no acceptable abstract syntax was configured
    MissingAbstractSyntax,

    #[snafu(display("association control error: {}", source))]
    Acse { source: acse::Error },

    /// the peer's association request was rejected by local access control
    RejectedLocally,

    /// an unexpected primitive was received while awaiting an association request
    UnexpectedPrimitive,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A DICOM association builder for an acceptor node, often taking the role
/// of a service class provider (SCP). The outcome of a call to
/// [`accept`](ServerAssociationOptions::accept) is an [`Association`].
///
/// The SCP accepts every abstract syntax configured through
/// [`with_abstract_syntax`](Self::with_abstract_syntax), offering every
/// configured transfer syntax for each. By default any calling AE title is
/// admitted; call [`accept_called_ae_title`](Self::accept_called_ae_title)
/// to only admit requests whose called AE title matches this node's own, or
/// [`access_control`](Self::access_control) for a custom policy.
///
/// # Example
///
/// ```no_run
/// # use std::net::TcpListener;
/// # use dicom_ul::association::server::ServerAssociationOptions;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// # let listener: TcpListener = unimplemented!();
/// let scp_options = ServerAssociationOptions::new()
///     .ae_title("ANY-SCP")
///     .with_abstract_syntax("1.2.840.10008.1.1")
///     .with_transfer_syntax("1.2.840.10008.1.2.1");
///
/// let (stream, _address) = listener.accept()?;
/// let association = scp_options.accept(stream)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ServerAssociationOptions {
    ae_title: Cow<'static, str>,
    abstract_syntax_uids: Vec<Cow<'static, str>>,
    transfer_syntax_uids: Vec<Cow<'static, str>>,
    max_pdu_length: u32,
    artim_timeout: Duration,
    access_control: Arc<dyn AccessControl>,
}

impl Default for ServerAssociationOptions {
    fn default() -> Self {
        ServerAssociationOptions {
            ae_title: "THIS-SCP".into(),
            abstract_syntax_uids: Vec::new(),
            transfer_syntax_uids: Vec::new(),
            max_pdu_length: DEFAULT_MAX_PDU,
            artim_timeout: DEFAULT_ARTIM_TIMEOUT,
            access_control: Arc::new(AcceptAny),
        }
    }
}

impl ServerAssociationOptions {
    /// Create a new set of options for negotiating associations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the application entity title referring to this DICOM node.
    /// The default is `THIS-SCP`.
    pub fn ae_title<T>(mut self, ae_title: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.ae_title = ae_title.into();
        self
    }

    /// Include this abstract syntax among those this node accepts.
    pub fn with_abstract_syntax<T>(mut self, abstract_syntax_uid: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.abstract_syntax_uids
            .push(trim_uid(abstract_syntax_uid.into()));
        self
    }

    /// Include this transfer syntax as an option for every accepted
    /// abstract syntax.
    pub fn with_transfer_syntax<T>(mut self, transfer_syntax_uid: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.transfer_syntax_uids
            .push(trim_uid(transfer_syntax_uid.into()));
        self
    }

    /// Override the maximum PDU length this node is willing to receive.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Override the ARTIM timeout applied while awaiting the request.
    pub fn artim_timeout(mut self, value: Duration) -> Self {
        self.artim_timeout = value;
        self
    }

    /// Accept any incoming association regardless of AE titles. This is
    /// the default.
    pub fn accept_any(mut self) -> Self {
        self.access_control = Arc::new(AcceptAny);
        self
    }

    /// Only accept an association whose called AE title matches this
    /// node's own.
    pub fn accept_called_ae_title(mut self) -> Self {
        self.access_control = Arc::new(AcceptCalledAeTitle {
            ae_title: self.ae_title.to_string(),
        });
        self
    }

    /// Install a custom access control policy.
    pub fn access_control(mut self, access_control: impl AccessControl + 'static) -> Self {
        self.access_control = Arc::new(access_control);
        self
    }

    fn acceptable_contexts(&self) -> Vec<AcceptableContext> {
        self.abstract_syntax_uids
            .iter()
            .map(|abstract_syntax| AcceptableContext {
                abstract_syntax: abstract_syntax.to_string(),
                transfer_syntaxes: self
                    .transfer_syntax_uids
                    .iter()
                    .map(|ts| ts.to_string())
                    .collect(),
            })
            .collect()
    }

    /// Negotiate an association out of an already-accepted TCP stream.
    ///
    /// Access-control rejection happens inside the DUL provider before the
    /// request would otherwise be indicated here; in that case the
    /// provider sends the A-ASSOCIATE-RJ itself and this call fails with
    /// [`Error::RejectedLocally`].
    pub fn accept(&self, stream: TcpStream) -> Result<Association> {
        ensure!(!self.abstract_syntax_uids.is_empty(), MissingAbstractSyntaxSnafu);

        let dul = DulProvider::for_acceptor(
            stream,
            self.max_pdu_length,
            self.artim_timeout,
            Arc::clone(&self.access_control),
        );

        let request = match dul.receive() {
            Ok(FromProvider::AssociateIndication(rq)) => rq,
            Ok(_) => return UnexpectedPrimitiveSnafu.fail(),
            Err(_) => return RejectedLocallySnafu.fail(),
        };

        let acceptable_contexts = self.acceptable_contexts();
        acse::accept(
            dul,
            &request,
            self.ae_title.to_string(),
            self.max_pdu_length,
            IMPLEMENTATION_CLASS_UID,
            IMPLEMENTATION_VERSION_NAME,
            &acceptable_contexts,
        )
        .context(AcseSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_access_control_is_accept_any() {
        let options = ServerAssociationOptions::new();
        assert_eq!(options.ae_title, "THIS-SCP");
        assert!(options.abstract_syntax_uids.is_empty());
    }
}
