//! Protocol Data Unit types.
//!
//! This module holds the pure data structures for the seven PDU kinds of the
//! DICOM Upper Layer protocol, along with their nested item types. Encoding
//! and decoding live in [`writer`] and [`reader`]; this module performs no
//! I/O.

pub mod commands;
pub mod generated;
pub mod reader;
pub mod writer;

#[cfg(test)]
mod test;

pub use reader::{read_pdu, DEFAULT_MAX_PDU, MAXIMUM_PDU_SIZE, MINIMUM_PDU_SIZE, PDU_HEADER_SIZE};
pub use writer::write_pdu;

/// A complete Upper Layer protocol data unit.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Pdu {
    AssociationRQ(AssociationRQ),
    AssociationAC(AssociationAC),
    AssociationRJ(AssociationRJ),
    PData { data: Vec<PDataValue> },
    ReleaseRQ,
    ReleaseRP,
    AbortRQ { source: AbortRQSource },
    /// A PDU of a type this codec does not recognize. The raw payload is
    /// preserved so that a peer which merely forwards PDUs can round-trip
    /// it, but nothing else can be done with it.
    Unknown { pdu_type: u8, data: Vec<u8> },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssociationRQ {
    pub protocol_version: u16,
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub application_context_name: String,
    pub presentation_contexts: Vec<PresentationContextProposed>,
    pub user_variables: Vec<UserVariableItem>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssociationAC {
    pub protocol_version: u16,
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub application_context_name: String,
    pub presentation_contexts: Vec<PresentationContextResult>,
    pub user_variables: Vec<UserVariableItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssociationRJ {
    pub result: AssociationRJResult,
    pub source: AssociationRJSource,
}

/// A proposed presentation context, as carried by an A-ASSOCIATE-RQ.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PresentationContextProposed {
    pub id: u8,
    pub abstract_syntax: String,
    pub transfer_syntaxes: Vec<String>,
}

/// A negotiated presentation context, as carried by an A-ASSOCIATE-AC.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PresentationContextResult {
    pub id: u8,
    pub reason: PresentationContextResultReason,
    pub transfer_syntax: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PresentationContextResultReason {
    Acceptance = 0,
    UserRejection = 1,
    NoReason = 2,
    AbstractSyntaxNotSupported = 3,
    TransferSyntaxesNotSupported = 4,
}

impl PresentationContextResultReason {
    pub(crate) fn from(value: u8) -> Option<Self> {
        use PresentationContextResultReason::*;
        Some(match value {
            0 => Acceptance,
            1 => UserRejection,
            2 => NoReason,
            3 => AbstractSyntaxNotSupported,
            4 => TransferSyntaxesNotSupported,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AssociationRJResult {
    Permanent = 1,
    Transient = 2,
}

impl AssociationRJResult {
    pub(crate) fn from(value: u8) -> Option<Self> {
        Some(match value {
            1 => AssociationRJResult::Permanent,
            2 => AssociationRJResult::Transient,
            _ => return None,
        })
    }

    pub(crate) fn to_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AssociationRJSource {
    ServiceUser(AssociationRJServiceUserReason),
    ServiceProviderASCE(AssociationRJServiceProviderASCEReason),
    ServiceProviderPresentation(AssociationRJServiceProviderPresentationReason),
}

impl AssociationRJSource {
    pub(crate) fn from(source: u8, reason: u8) -> Option<Self> {
        Some(match source {
            1 => AssociationRJSource::ServiceUser(AssociationRJServiceUserReason::from(reason)?),
            2 => AssociationRJSource::ServiceProviderASCE(
                AssociationRJServiceProviderASCEReason::from(reason)?,
            ),
            3 => AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::from(reason),
            ),
            _ => return None,
        })
    }

    pub(crate) fn to_bytes(self) -> (u8, u8) {
        match self {
            AssociationRJSource::ServiceUser(reason) => (1, reason.to_u8()),
            AssociationRJSource::ServiceProviderASCE(reason) => (2, reason.to_u8()),
            AssociationRJSource::ServiceProviderPresentation(reason) => (3, reason.to_u8()),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AssociationRJServiceUserReason {
    NoReasonGiven,
    ApplicationContextNameNotSupported,
    CallingAETitleNotRecognized,
    CalledAETitleNotRecognized,
    Reserved(u8),
}

impl AssociationRJServiceUserReason {
    fn from(value: u8) -> Option<Self> {
        use AssociationRJServiceUserReason::*;
        Some(match value {
            1 => NoReasonGiven,
            2 => ApplicationContextNameNotSupported,
            3 => CallingAETitleNotRecognized,
            7 => CalledAETitleNotRecognized,
            v => Reserved(v),
        })
    }

    fn to_u8(self) -> u8 {
        use AssociationRJServiceUserReason::*;
        match self {
            NoReasonGiven => 1,
            ApplicationContextNameNotSupported => 2,
            CallingAETitleNotRecognized => 3,
            CalledAETitleNotRecognized => 7,
            Reserved(v) => v,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AssociationRJServiceProviderASCEReason {
    NoReasonGiven,
    ProtocolVersionNotSupported,
}

impl AssociationRJServiceProviderASCEReason {
    fn from(value: u8) -> Option<Self> {
        Some(match value {
            1 => AssociationRJServiceProviderASCEReason::NoReasonGiven,
            2 => AssociationRJServiceProviderASCEReason::ProtocolVersionNotSupported,
            _ => return None,
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            AssociationRJServiceProviderASCEReason::NoReasonGiven => 1,
            AssociationRJServiceProviderASCEReason::ProtocolVersionNotSupported => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AssociationRJServiceProviderPresentationReason {
    TemporaryCongestion,
    LocalLimitExceeded,
    Reserved(u8),
}

impl AssociationRJServiceProviderPresentationReason {
    fn from(value: u8) -> Self {
        match value {
            1 => AssociationRJServiceProviderPresentationReason::TemporaryCongestion,
            2 => AssociationRJServiceProviderPresentationReason::LocalLimitExceeded,
            v => AssociationRJServiceProviderPresentationReason::Reserved(v),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            AssociationRJServiceProviderPresentationReason::TemporaryCongestion => 1,
            AssociationRJServiceProviderPresentationReason::LocalLimitExceeded => 2,
            AssociationRJServiceProviderPresentationReason::Reserved(v) => v,
        }
    }
}

/// A single fragment of a command or data set, carried by a P-DATA-TF PDU.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PDataValue {
    pub presentation_context_id: u8,
    pub value_type: PDataValueType,
    pub is_last: bool,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PDataValueType {
    Command,
    Data,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AbortRQSource {
    ServiceUser,
    ServiceProvider(AbortRQServiceProviderReason),
    Reserved,
}

impl AbortRQSource {
    pub(crate) fn from(source: u8, reason: u8) -> Option<Self> {
        Some(match source {
            0 => AbortRQSource::ServiceUser,
            1 => AbortRQSource::Reserved,
            2 => AbortRQSource::ServiceProvider(AbortRQServiceProviderReason::from(reason)?),
            _ => return None,
        })
    }

    pub(crate) fn to_bytes(self) -> (u8, u8) {
        match self {
            AbortRQSource::ServiceUser => (0, 0),
            AbortRQSource::Reserved => (1, 0),
            AbortRQSource::ServiceProvider(reason) => (2, reason.to_u8()),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AbortRQServiceProviderReason {
    ReasonNotSpecifiedUnrecognizedPDU,
    UnexpectedPDU,
    Reserved,
    UnrecognizedPDUParameter,
    UnexpectedPDUParameter,
    InvalidPDUParameter,
}

impl AbortRQServiceProviderReason {
    fn from(value: u8) -> Option<Self> {
        use AbortRQServiceProviderReason::*;
        Some(match value {
            0 => ReasonNotSpecifiedUnrecognizedPDU,
            1 => UnexpectedPDU,
            2 => Reserved,
            4 => UnrecognizedPDUParameter,
            5 => UnexpectedPDUParameter,
            6 => InvalidPDUParameter,
            _ => return None,
        })
    }

    fn to_u8(self) -> u8 {
        use AbortRQServiceProviderReason::*;
        match self {
            ReasonNotSpecifiedUnrecognizedPDU => 0,
            UnexpectedPDU => 1,
            Reserved => 2,
            UnrecognizedPDUParameter => 4,
            UnexpectedPDUParameter => 5,
            InvalidPDUParameter => 6,
        }
    }
}

/// An item found while parsing the body of an A-ASSOCIATE-RQ/AC PDU.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum PduVariableItem {
    Unknown(u8),
    ApplicationContext(String),
    PresentationContextProposed(PresentationContextProposed),
    PresentationContextResult(PresentationContextResult),
    UserVariables(Vec<UserVariableItem>),
}

/// A sub-item of the User Information item.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum UserVariableItem {
    /// An unrecognized sub-item, kept verbatim for round-trip.
    Unknown(u8, Vec<u8>),
    MaxLength(u32),
    ImplementationClassUID(String),
    ImplementationVersionName(String),
    AsynchronousOperationsWindow {
        max_operations_invoked: u16,
        max_operations_performed: u16,
    },
    ScpScuRoleSelection(RoleSelection),
    SopClassExtendedNegotiation(String, Vec<u8>),
    UserIdentity(UserIdentity),
}

/// The SCP/SCU Role Selection sub-item (0x54): which of the two roles the
/// sender is willing to perform for a given abstract syntax.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RoleSelection {
    pub sop_class_uid: String,
    pub scu_role: bool,
    pub scp_role: bool,
}

/// The kind of credential carried by a User Identity Negotiation sub-item.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum UserIdentityType {
    Username = 1,
    UsernameAndPassword = 2,
    Kerberos = 3,
    Saml = 4,
    Jwt = 5,
}

impl UserIdentityType {
    pub(crate) fn from(value: u8) -> Option<Self> {
        use UserIdentityType::*;
        Some(match value {
            1 => Username,
            2 => UsernameAndPassword,
            3 => Kerberos,
            4 => Saml,
            5 => Jwt,
            _ => return None,
        })
    }

    pub(crate) fn to_u8(self) -> u8 {
        self as u8
    }
}

/// The User Identity Negotiation sub-item (0x58).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct UserIdentity {
    pub positive_response_requested: bool,
    pub identity_type: UserIdentityType,
    pub primary_field: Vec<u8>,
    pub secondary_field: Vec<u8>,
}

impl UserIdentity {
    pub fn new(
        positive_response_requested: bool,
        identity_type: UserIdentityType,
        primary_field: Vec<u8>,
        secondary_field: Vec<u8>,
    ) -> Self {
        UserIdentity {
            positive_response_requested,
            identity_type,
            primary_field,
            secondary_field,
        }
    }
}
