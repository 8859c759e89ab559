//! The Upper Layer state machine, PS3.8 Section 9.2.
//!
//! This module holds nothing but the pure state/event/action vocabulary and
//! the transition table (Table 9-10). It performs no I/O and owns no
//! mutable state; [`crate::dul`] drives it and carries out the actions it
//! names.

use crate::pdu::Pdu;

/// One of the thirteen states of the association state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum State {
    /// Sta1: Idle, no association.
    Idle,
    /// Sta2: transport connection open, awaiting A-ASSOCIATE-RQ.
    AwaitingAssociateRq,
    /// Sta3: awaiting local A-ASSOCIATE response.
    AwaitingLocalAssociateResponse,
    /// Sta4: awaiting transport connection to complete.
    AwaitingTransportConnection,
    /// Sta5: awaiting A-ASSOCIATE-AC or -RJ.
    AwaitingAssociateResponse,
    /// Sta6: association established, ready for data transfer.
    DataTransfer,
    /// Sta7: awaiting A-RELEASE-RP.
    AwaitingReleaseRp,
    /// Sta8: awaiting local A-RELEASE response.
    AwaitingLocalReleaseResponse,
    /// Sta9: release collision, requestor side, awaiting local response.
    ReleaseCollisionRequestorAwaitingResponse,
    /// Sta10: release collision, acceptor side, awaiting A-RELEASE-RP.
    ReleaseCollisionAcceptorAwaitingReleaseRp,
    /// Sta11: release collision, requestor side, awaiting A-RELEASE-RP.
    ReleaseCollisionRequestorAwaitingReleaseRp,
    /// Sta12: release collision, acceptor side, awaiting local response.
    ReleaseCollisionAcceptorAwaitingResponse,
    /// Sta13: awaiting transport connection close.
    AwaitingClose,
}

impl State {
    /// A short human-readable description, as kept in the standard's state table.
    pub fn description(self) -> &'static str {
        use State::*;
        match self {
            Idle => "Idle",
            AwaitingAssociateRq => "Transport connection open (awaiting A-ASSOCIATE-RQ PDU)",
            AwaitingLocalAssociateResponse => {
                "Awaiting local A-ASSOCIATE response primitive (from local user)"
            }
            AwaitingTransportConnection => {
                "Awaiting transport connection opening to complete (from local transport service)"
            }
            AwaitingAssociateResponse => "Awaiting A-ASSOCIATE-AC or A-ASSOCIATE-RJ PDU",
            DataTransfer => "Association established and ready for data transfer",
            AwaitingReleaseRp => "Awaiting A-RELEASE-RP PDU",
            AwaitingLocalReleaseResponse => {
                "Awaiting local A-RELEASE response primitive (from local user)"
            }
            ReleaseCollisionRequestorAwaitingResponse => {
                "Release collision requestor side; awaiting A-RELEASE response"
            }
            ReleaseCollisionAcceptorAwaitingReleaseRp => {
                "Release collision acceptor side; awaiting A-RELEASE-RP PDU"
            }
            ReleaseCollisionRequestorAwaitingReleaseRp => {
                "Release collision requestor side; awaiting A-RELEASE-RP PDU"
            }
            ReleaseCollisionAcceptorAwaitingResponse => {
                "Release collision acceptor side; awaiting A-RELEASE response primitive"
            }
            AwaitingClose => {
                "Awaiting transport connection close indication (association no longer exists)"
            }
        }
    }
}

/// One of the nineteen events of the association state machine (Table 9-10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Event {
    /// Evt1: A-ASSOCIATE request (local user).
    AssociateRequest,
    /// Evt2: transport connect confirmation.
    TransportConnectConfirm,
    /// Evt3: A-ASSOCIATE-AC PDU received.
    AssociateAcReceived,
    /// Evt4: A-ASSOCIATE-RJ PDU received.
    AssociateRjReceived,
    /// Evt5: transport connection indication (incoming connection accepted).
    TransportConnectIndication,
    /// Evt6: A-ASSOCIATE-RQ PDU received.
    AssociateRqReceived,
    /// Evt7: A-ASSOCIATE response primitive (accept).
    AssociateResponseAccept,
    /// Evt8: A-ASSOCIATE response primitive (reject).
    AssociateResponseReject,
    /// Evt9: P-DATA request primitive.
    PDataRequest,
    /// Evt10: P-DATA-TF PDU received.
    PDataReceived,
    /// Evt11: A-RELEASE request primitive.
    ReleaseRequest,
    /// Evt12: A-RELEASE-RQ PDU received.
    ReleaseRqReceived,
    /// Evt13: A-RELEASE-RP PDU received.
    ReleaseRpReceived,
    /// Evt14: A-RELEASE response primitive.
    ReleaseResponse,
    /// Evt15: A-ABORT request primitive (local user aborts).
    AbortRequest,
    /// Evt16: A-ABORT PDU received.
    AbortReceived,
    /// Evt17: transport connection closed indication.
    TransportClosed,
    /// Evt18: ARTIM timer expired.
    ArtimExpired,
    /// Evt19: unrecognized or invalid PDU received.
    InvalidPdu,
}

/// The PDU-triggered half of event derivation (PS3.8 event Evt3/4/6/10/12/13/16).
///
/// Primitive-triggered events (Evt1, Evt7-9, Evt11, Evt14-15) come from the
/// service-user side and are not derivable from a PDU.
pub fn event_for_pdu(pdu: &Pdu) -> Event {
    match pdu {
        Pdu::AssociationRQ(_) => Event::AssociateRqReceived,
        Pdu::AssociationAC(_) => Event::AssociateAcReceived,
        Pdu::AssociationRJ(_) => Event::AssociateRjReceived,
        Pdu::PData { .. } => Event::PDataReceived,
        Pdu::ReleaseRQ => Event::ReleaseRqReceived,
        Pdu::ReleaseRP => Event::ReleaseRpReceived,
        Pdu::AbortRQ { .. } => Event::AbortReceived,
        Pdu::Unknown { .. } => Event::InvalidPdu,
    }
}

/// One of the named actions of the association state machine (Tables 9-6
/// through 9-9). The suffixed number matches the standard's own numbering
/// (`Ae1` is AE-1, `Aa8` is AA-8, and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Action {
    Ae1,
    Ae2,
    Ae3,
    Ae4,
    Ae5,
    Ae6,
    Ae7,
    Ae8,
    Dt1,
    Dt2,
    Ar1,
    Ar2,
    Ar3,
    Ar4,
    Ar5,
    Ar6,
    Ar7,
    Ar8,
    Ar9,
    Ar10,
    Aa1,
    Aa2,
    Aa3,
    Aa4,
    Aa5,
    Aa6,
    Aa7,
    Aa8,
}

/// Look up the action triggered by `event` while in `state`.
///
/// Returns `None` for (event, state) pairs the standard's transition table
/// does not define; [`crate::dul`] treats an undefined pair the same way it
/// would treat [`Action::Aa8`] (AA-8, an invalid event in the current
/// state), which aborts the association.
pub fn lookup(event: Event, state: State) -> Option<Action> {
    use Action::*;
    use Event::*;
    use State::*;

    Some(match (event, state) {
        (AssociateRequest, Idle) => Ae1,

        (TransportConnectConfirm, AwaitingTransportConnection) => Ae2,

        (AssociateAcReceived, AwaitingAssociateRq) => Aa1,
        (AssociateAcReceived, AwaitingLocalAssociateResponse) => Aa8,
        (AssociateAcReceived, AwaitingAssociateResponse) => Ae3,
        (AssociateAcReceived, DataTransfer) => Aa8,
        (AssociateAcReceived, AwaitingReleaseRp) => Aa8,
        (AssociateAcReceived, AwaitingLocalReleaseResponse) => Aa8,
        (AssociateAcReceived, ReleaseCollisionRequestorAwaitingResponse) => Aa8,
        (AssociateAcReceived, ReleaseCollisionAcceptorAwaitingReleaseRp) => Aa8,
        (AssociateAcReceived, ReleaseCollisionRequestorAwaitingReleaseRp) => Aa8,
        (AssociateAcReceived, ReleaseCollisionAcceptorAwaitingResponse) => Aa8,
        (AssociateAcReceived, AwaitingClose) => Aa6,

        (AssociateRjReceived, AwaitingAssociateRq) => Aa1,
        (AssociateRjReceived, AwaitingLocalAssociateResponse) => Aa8,
        (AssociateRjReceived, AwaitingAssociateResponse) => Ae4,
        (AssociateRjReceived, DataTransfer) => Aa8,
        (AssociateRjReceived, AwaitingReleaseRp) => Aa8,
        (AssociateRjReceived, AwaitingLocalReleaseResponse) => Aa8,
        (AssociateRjReceived, ReleaseCollisionRequestorAwaitingResponse) => Aa8,
        (AssociateRjReceived, ReleaseCollisionAcceptorAwaitingReleaseRp) => Aa8,
        (AssociateRjReceived, ReleaseCollisionRequestorAwaitingReleaseRp) => Aa8,
        (AssociateRjReceived, ReleaseCollisionAcceptorAwaitingResponse) => Aa8,
        (AssociateRjReceived, AwaitingClose) => Aa6,

        (TransportConnectIndication, Idle) => Ae5,

        (AssociateRqReceived, AwaitingAssociateRq) => Ae6,
        (AssociateRqReceived, AwaitingLocalAssociateResponse) => Aa8,
        (AssociateRqReceived, AwaitingAssociateResponse) => Aa8,
        (AssociateRqReceived, DataTransfer) => Aa8,
        (AssociateRqReceived, AwaitingReleaseRp) => Aa8,
        (AssociateRqReceived, AwaitingLocalReleaseResponse) => Aa8,
        (AssociateRqReceived, ReleaseCollisionRequestorAwaitingResponse) => Aa8,
        (AssociateRqReceived, ReleaseCollisionAcceptorAwaitingReleaseRp) => Aa8,
        (AssociateRqReceived, ReleaseCollisionRequestorAwaitingReleaseRp) => Aa8,
        (AssociateRqReceived, ReleaseCollisionAcceptorAwaitingResponse) => Aa8,
        (AssociateRqReceived, AwaitingClose) => Aa7,

        (AssociateResponseAccept, AwaitingLocalAssociateResponse) => Ae7,

        (AssociateResponseReject, AwaitingLocalAssociateResponse) => Ae8,

        (PDataRequest, DataTransfer) => Dt1,
        (PDataRequest, AwaitingLocalReleaseResponse) => Ar7,

        (PDataReceived, AwaitingAssociateRq) => Aa1,
        (PDataReceived, AwaitingLocalAssociateResponse) => Aa8,
        (PDataReceived, AwaitingAssociateResponse) => Aa8,
        (PDataReceived, DataTransfer) => Dt2,
        (PDataReceived, AwaitingReleaseRp) => Ar6,
        (PDataReceived, AwaitingLocalReleaseResponse) => Aa8,
        (PDataReceived, ReleaseCollisionRequestorAwaitingResponse) => Aa8,
        (PDataReceived, ReleaseCollisionAcceptorAwaitingReleaseRp) => Aa8,
        (PDataReceived, ReleaseCollisionRequestorAwaitingReleaseRp) => Aa8,
        (PDataReceived, ReleaseCollisionAcceptorAwaitingResponse) => Aa8,
        (PDataReceived, AwaitingClose) => Aa6,

        (ReleaseRequest, DataTransfer) => Ar1,

        (ReleaseRqReceived, AwaitingAssociateRq) => Aa1,
        (ReleaseRqReceived, AwaitingLocalAssociateResponse) => Aa8,
        (ReleaseRqReceived, AwaitingAssociateResponse) => Aa8,
        (ReleaseRqReceived, DataTransfer) => Ar2,
        (ReleaseRqReceived, AwaitingReleaseRp) => Ar8,
        (ReleaseRqReceived, AwaitingLocalReleaseResponse) => Aa8,
        (ReleaseRqReceived, ReleaseCollisionRequestorAwaitingResponse) => Aa8,
        (ReleaseRqReceived, ReleaseCollisionAcceptorAwaitingReleaseRp) => Aa8,
        (ReleaseRqReceived, ReleaseCollisionRequestorAwaitingReleaseRp) => Aa8,
        (ReleaseRqReceived, ReleaseCollisionAcceptorAwaitingResponse) => Aa8,
        (ReleaseRqReceived, AwaitingClose) => Aa6,

        (ReleaseRpReceived, AwaitingAssociateRq) => Aa1,
        (ReleaseRpReceived, AwaitingLocalAssociateResponse) => Aa8,
        (ReleaseRpReceived, AwaitingAssociateResponse) => Aa8,
        (ReleaseRpReceived, DataTransfer) => Aa8,
        (ReleaseRpReceived, AwaitingReleaseRp) => Ar3,
        (ReleaseRpReceived, AwaitingLocalReleaseResponse) => Aa8,
        (ReleaseRpReceived, ReleaseCollisionRequestorAwaitingResponse) => Aa8,
        (ReleaseRpReceived, ReleaseCollisionAcceptorAwaitingReleaseRp) => Ar10,
        (ReleaseRpReceived, ReleaseCollisionRequestorAwaitingReleaseRp) => Ar3,
        (ReleaseRpReceived, ReleaseCollisionAcceptorAwaitingResponse) => Aa8,
        (ReleaseRpReceived, AwaitingClose) => Aa6,

        (ReleaseResponse, AwaitingLocalReleaseResponse) => Ar4,
        (ReleaseResponse, ReleaseCollisionRequestorAwaitingResponse) => Ar9,
        (ReleaseResponse, ReleaseCollisionAcceptorAwaitingResponse) => Ar4,

        (AbortRequest, AwaitingLocalAssociateResponse) => Aa1,
        (AbortRequest, AwaitingTransportConnection) => Aa2,
        (AbortRequest, AwaitingAssociateResponse) => Aa1,
        (AbortRequest, DataTransfer) => Aa1,
        (AbortRequest, AwaitingReleaseRp) => Aa1,
        (AbortRequest, AwaitingLocalReleaseResponse) => Aa1,
        (AbortRequest, ReleaseCollisionRequestorAwaitingResponse) => Aa1,
        (AbortRequest, ReleaseCollisionAcceptorAwaitingReleaseRp) => Aa1,
        (AbortRequest, ReleaseCollisionRequestorAwaitingReleaseRp) => Aa1,
        (AbortRequest, ReleaseCollisionAcceptorAwaitingResponse) => Aa1,

        (AbortReceived, AwaitingAssociateRq) => Aa2,
        (AbortReceived, AwaitingLocalAssociateResponse) => Aa3,
        (AbortReceived, AwaitingAssociateResponse) => Aa3,
        (AbortReceived, DataTransfer) => Aa3,
        (AbortReceived, AwaitingReleaseRp) => Aa3,
        (AbortReceived, AwaitingLocalReleaseResponse) => Aa3,
        (AbortReceived, ReleaseCollisionRequestorAwaitingResponse) => Aa3,
        (AbortReceived, ReleaseCollisionAcceptorAwaitingReleaseRp) => Aa3,
        (AbortReceived, ReleaseCollisionRequestorAwaitingReleaseRp) => Aa3,
        (AbortReceived, ReleaseCollisionAcceptorAwaitingResponse) => Aa3,
        (AbortReceived, AwaitingClose) => Aa2,

        (TransportClosed, AwaitingAssociateRq) => Aa5,
        (TransportClosed, AwaitingLocalAssociateResponse) => Aa4,
        (TransportClosed, AwaitingTransportConnection) => Aa4,
        (TransportClosed, AwaitingAssociateResponse) => Aa4,
        (TransportClosed, DataTransfer) => Aa4,
        (TransportClosed, AwaitingReleaseRp) => Aa4,
        (TransportClosed, AwaitingLocalReleaseResponse) => Aa4,
        (TransportClosed, ReleaseCollisionRequestorAwaitingResponse) => Aa4,
        (TransportClosed, ReleaseCollisionAcceptorAwaitingReleaseRp) => Aa4,
        (TransportClosed, ReleaseCollisionRequestorAwaitingReleaseRp) => Aa4,
        (TransportClosed, ReleaseCollisionAcceptorAwaitingResponse) => Aa4,
        (TransportClosed, AwaitingClose) => Ar5,

        (ArtimExpired, AwaitingAssociateRq) => Aa2,
        (ArtimExpired, AwaitingClose) => Aa2,

        (InvalidPdu, AwaitingAssociateRq) => Aa1,
        (InvalidPdu, AwaitingLocalAssociateResponse) => Aa8,
        (InvalidPdu, AwaitingAssociateResponse) => Aa8,
        (InvalidPdu, DataTransfer) => Aa8,
        (InvalidPdu, AwaitingReleaseRp) => Aa8,
        (InvalidPdu, AwaitingLocalReleaseResponse) => Aa8,
        (InvalidPdu, ReleaseCollisionRequestorAwaitingResponse) => Aa8,
        (InvalidPdu, ReleaseCollisionAcceptorAwaitingReleaseRp) => Aa8,
        (InvalidPdu, ReleaseCollisionRequestorAwaitingReleaseRp) => Aa8,
        (InvalidPdu, ReleaseCollisionAcceptorAwaitingResponse) => Aa8,
        (InvalidPdu, AwaitingClose) => Aa7,

        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Event::AssociateRequest, State::Idle, Action::Ae1)]
    #[case(Event::AssociateRqReceived, State::AwaitingAssociateRq, Action::Ae6)]
    #[case(Event::PDataRequest, State::DataTransfer, Action::Dt1)]
    #[case(Event::ReleaseRequest, State::DataTransfer, Action::Ar1)]
    #[case(Event::ReleaseResponse, State::ReleaseCollisionRequestorAwaitingResponse, Action::Ar9)]
    #[case(Event::ArtimExpired, State::AwaitingAssociateRq, Action::Aa2)]
    fn known_transitions_resolve(#[case] event: Event, #[case] state: State, #[case] expected: Action) {
        assert_eq!(lookup(event, state), Some(expected));
    }

    #[test]
    fn undefined_transition_is_none() {
        assert_eq!(lookup(Event::AssociateRequest, State::DataTransfer), None);
    }

    #[test]
    fn invalid_pdu_in_established_association_aborts() {
        assert_eq!(lookup(Event::InvalidPdu, State::DataTransfer), Some(Action::Aa8));
    }
}
