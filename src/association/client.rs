//! Association requestor module.
//!
//! [`ClientAssociationOptions`] mirrors the acceptor-side builder in
//! [`super::server`]: a fluent configuration object whose terminal
//! [`establish`](ClientAssociationOptions::establish) opens the TCP
//! connection, starts a [`DulProvider`] for it, and drives [`acse`] through
//! to an established [`Association`].

use std::borrow::Cow;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use snafu::{ensure, ResultExt, Snafu};

use crate::association::acse::{self, ProposedContext, RequestOutcome};
use crate::association::Association;
use crate::dul::DulProvider;
use crate::pdu::{AbortRQSource, AssociationRJ, DEFAULT_MAX_PDU};
use crate::{IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME};

/// Default ARTIM timeout applied to a requested association.
const DEFAULT_ARTIM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// missing abstract syntax to begin negotiation
    MissingAbstractSyntax,

    /// could not connect to the peer
    Connect { source: std::io::Error },

    #[snafu(display("association control error: {}", source))]
    Acse { source: acse::Error },

    /// the association was rejected by the acceptor
    Rejected { association_rj: AssociationRJ },

    /// the association was aborted before it was established
    Aborted { source: AbortRQSource },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A DICOM association builder for a requesting node, often taking the role
/// of a service class user (SCU). The outcome is an [`Association`].
///
/// # Example
///
/// ```no_run
/// # use dicom_ul::association::client::ClientAssociationOptions;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let association = ClientAssociationOptions::new()
///     .calling_ae_title("THIS-SCU")
///     .called_ae_title("ANY-SCP")
///     .with_abstract_syntax("1.2.840.10008.1.1")
///     .with_transfer_syntax("1.2.840.10008.1.2.1")
///     .establish("127.0.0.1:104")?;
/// # Ok(())
/// # }
/// ```
///
/// If no transfer syntax is given, Explicit VR Little Endian and Implicit
/// VR Little Endian are proposed by default.
#[derive(Debug, Clone)]
pub struct ClientAssociationOptions {
    calling_ae_title: Cow<'static, str>,
    called_ae_title: Cow<'static, str>,
    abstract_syntax_uids: Vec<Cow<'static, str>>,
    transfer_syntax_uids: Vec<Cow<'static, str>>,
    max_pdu_length: u32,
    artim_timeout: Duration,
}

impl Default for ClientAssociationOptions {
    fn default() -> Self {
        ClientAssociationOptions {
            calling_ae_title: "THIS-SCU".into(),
            called_ae_title: "ANY-SCP".into(),
            abstract_syntax_uids: Vec::new(),
            transfer_syntax_uids: Vec::new(),
            max_pdu_length: DEFAULT_MAX_PDU,
            artim_timeout: DEFAULT_ARTIM_TIMEOUT,
        }
    }
}

impl ClientAssociationOptions {
    /// Create a new set of options for establishing an association.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the calling application entity title, referring to this node.
    /// The default is `THIS-SCU`.
    pub fn calling_ae_title<T>(mut self, calling_ae_title: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.calling_ae_title = calling_ae_title.into();
        self
    }

    /// Define the called application entity title, referring to the peer.
    /// The default is `ANY-SCP`.
    pub fn called_ae_title<T>(mut self, called_ae_title: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.called_ae_title = called_ae_title.into();
        self
    }

    /// Include this abstract syntax in the list of proposed presentation
    /// contexts.
    pub fn with_abstract_syntax<T>(mut self, abstract_syntax_uid: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.abstract_syntax_uids.push(abstract_syntax_uid.into());
        self
    }

    /// Include this transfer syntax in each proposed presentation context.
    pub fn with_transfer_syntax<T>(mut self, transfer_syntax_uid: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.transfer_syntax_uids.push(transfer_syntax_uid.into());
        self
    }

    /// Override the maximum PDU length this node is willing to receive.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Override the ARTIM timeout applied while waiting for the acceptor's
    /// response.
    pub fn artim_timeout(mut self, value: Duration) -> Self {
        self.artim_timeout = value;
        self
    }

    /// Connect to `address` and negotiate an association.
    pub fn establish<A: ToSocketAddrs>(self, address: A) -> Result<Association> {
        ensure!(!self.abstract_syntax_uids.is_empty(), MissingAbstractSyntaxSnafu);

        let mut transfer_syntax_uids = self.transfer_syntax_uids;
        if transfer_syntax_uids.is_empty() {
            transfer_syntax_uids.push("1.2.840.10008.1.2.1".into());
            transfer_syntax_uids.push("1.2.840.10008.1.2".into());
        }

        let proposed_contexts: Vec<ProposedContext> = self
            .abstract_syntax_uids
            .iter()
            .map(|abstract_syntax| ProposedContext {
                abstract_syntax: abstract_syntax.to_string(),
                transfer_syntaxes: transfer_syntax_uids.iter().map(|ts| ts.to_string()).collect(),
            })
            .collect();

        let request = acse::build_request(
            &self.calling_ae_title,
            &self.called_ae_title,
            self.max_pdu_length,
            IMPLEMENTATION_CLASS_UID,
            IMPLEMENTATION_VERSION_NAME,
            &proposed_contexts,
            vec![],
        );
        let sent_contexts = request.presentation_contexts.clone();

        let stream = TcpStream::connect(address).context(ConnectSnafu)?;

        let dul = DulProvider::for_requestor(stream, request, self.max_pdu_length, self.artim_timeout);

        match acse::await_response(
            dul,
            self.calling_ae_title.to_string(),
            self.called_ae_title.to_string(),
            &sent_contexts,
        )
        .context(AcseSnafu)?
        {
            RequestOutcome::Accepted(association) => Ok(association),
            RequestOutcome::Rejected(association_rj) => RejectedSnafu { association_rj }.fail(),
            RequestOutcome::Aborted(source) => AbortedSnafu { source }.fail(),
        }
    }
}
