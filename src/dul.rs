//! DUL (DICOM Upper Layer) Service Provider.
//!
//! Runs the [`fsm`](crate::fsm) state machine against a TCP connection on a
//! dedicated thread, exposing the association to its owner through a pair
//! of [`std::sync::mpsc`] channels. This is the layer
//! [`acse`](crate::association::acse) is built on top of.
//!
//! Opening the transport connection itself is left to the caller: a
//! [`DulProvider`] is constructed from an already-connected
//! [`TcpStream`], skipping straight to the state the standard's Sta4
//! (requestor) or Sta1 (acceptor) transition would have produced.

use std::io::{self, Read};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use snafu::Snafu;
use tracing::{debug, info, warn};

use crate::fsm::{self, Action, Event, State};
use crate::pdu::reader::read_pdu;
use crate::pdu::writer::write_pdu;
use crate::pdu::{
    AbortRQServiceProviderReason, AbortRQSource, AssociationAC, AssociationRJ, AssociationRJResult,
    AssociationRJServiceUserReason, AssociationRJSource, AssociationRQ, PDataValue, Pdu,
};
use crate::timer::ArtimTimer;

/// Decides whether an incoming A-ASSOCIATE-RQ is acceptable, consulted by
/// the AE-6 action before the request reaches the user as an indication.
pub trait AccessControl: Send + Sync {
    /// Accept or reject `request`. A rejection is sent back to the peer
    /// verbatim without ever indicating the request to the local user.
    fn evaluate(&self, request: &AssociationRQ) -> AccessDecision;
}

/// The outcome of an [`AccessControl`] check.
#[derive(Debug)]
pub enum AccessDecision {
    Accept,
    Reject(AssociationRJ),
}

/// Accepts every incoming association request.
#[derive(Debug, Default)]
pub struct AcceptAny;

impl AccessControl for AcceptAny {
    fn evaluate(&self, _request: &AssociationRQ) -> AccessDecision {
        AccessDecision::Accept
    }
}

/// Accepts only requests whose called AE title matches this node's own.
#[derive(Debug)]
pub struct AcceptCalledAeTitle {
    pub ae_title: String,
}

impl AccessControl for AcceptCalledAeTitle {
    fn evaluate(&self, request: &AssociationRQ) -> AccessDecision {
        if request.called_ae_title.trim() == self.ae_title.trim() {
            AccessDecision::Accept
        } else {
            AccessDecision::Reject(AssociationRJ {
                result: AssociationRJResult::Permanent,
                source: AssociationRJSource::ServiceUser(
                    AssociationRJServiceUserReason::CalledAETitleNotRecognized,
                ),
            })
        }
    }
}

/// How long a network read blocks before the provider checks for a pending
/// user message or ARTIM expiry.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A message accepted from the service user, destined for the peer or for
/// the state machine's bookkeeping.
#[derive(Debug)]
#[non_exhaustive]
pub enum ToProvider {
    /// A-ASSOCIATE response, acceptor side only.
    AssociateResponse(AssociateResult),
    /// P-DATA request (Evt9).
    PData(Vec<PDataValue>),
    /// A-RELEASE request (Evt11).
    ReleaseRequest,
    /// A-RELEASE response (Evt14), in answer to a peer-initiated release.
    ReleaseResponse,
    /// A-ABORT request (Evt15).
    AbortRequest,
}

/// The outcome of an association request, as decided by the local user.
#[derive(Debug)]
pub enum AssociateResult {
    /// Accept the incoming association (Evt7), carrying the A-ASSOCIATE-AC
    /// to send back.
    Accept(AssociationAC),
    /// Reject the incoming association (Evt8), carrying the A-ASSOCIATE-RJ
    /// to send back.
    Reject(AssociationRJ),
}

/// A message delivered to the service user.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum FromProvider {
    /// A-ASSOCIATE indication: a peer is requesting association (acceptor side).
    AssociateIndication(AssociationRQ),
    /// A-ASSOCIATE confirmation (accept), requestor side.
    AssociateConfirmAccept(AssociationAC),
    /// A-ASSOCIATE confirmation (reject), requestor side.
    AssociateConfirmReject(AssociationRJ),
    /// P-DATA indication.
    PData(Vec<PDataValue>),
    /// A-RELEASE indication: the peer is requesting release.
    ReleaseIndication,
    /// A-RELEASE confirmation: a release this side initiated has completed.
    ReleaseConfirm,
    /// A-ABORT or A-P-ABORT indication.
    AbortIndication(AbortRQSource),
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("the DUL provider thread is no longer running"))]
    ProviderStopped,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A running DUL provider. Dropping this stops the underlying thread.
pub struct DulProvider {
    to_provider: Sender<ToProvider>,
    from_provider: Receiver<FromProvider>,
    peeked: Mutex<Option<FromProvider>>,
    state: Arc<Mutex<State>>,
    kill: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl DulProvider {
    /// Start a provider for an association being requested by this node.
    /// `stream` must already be connected to the peer; `request` is sent
    /// as soon as the machine reaches the point of transmitting the
    /// A-ASSOCIATE-RQ.
    pub fn for_requestor(
        stream: TcpStream,
        request: AssociationRQ,
        max_pdu_length: u32,
        artim_timeout: Duration,
    ) -> Self {
        Self::spawn(
            stream,
            max_pdu_length,
            artim_timeout,
            true,
            Some(request),
            Arc::new(AcceptAny),
        )
    }

    /// Start a provider for an association accepted from an incoming
    /// connection. `access_control` is consulted by the AE-6 action before
    /// the request is indicated to the user.
    pub fn for_acceptor(
        stream: TcpStream,
        max_pdu_length: u32,
        artim_timeout: Duration,
        access_control: Arc<dyn AccessControl>,
    ) -> Self {
        Self::spawn(
            stream,
            max_pdu_length,
            artim_timeout,
            false,
            None,
            access_control,
        )
    }

    fn spawn(
        stream: TcpStream,
        max_pdu_length: u32,
        artim_timeout: Duration,
        is_requestor: bool,
        outgoing_associate_rq: Option<AssociationRQ>,
        access_control: Arc<dyn AccessControl>,
    ) -> Self {
        let (to_provider_tx, to_provider_rx) = mpsc::channel();
        let (from_provider_tx, from_provider_rx) = mpsc::channel();
        let state = Arc::new(Mutex::new(State::Idle));
        let kill = Arc::new(AtomicBool::new(false));

        let thread_state = Arc::clone(&state);
        let thread_kill = Arc::clone(&kill);

        let join_handle = std::thread::Builder::new()
            .name("dul-provider".to_string())
            .spawn(move || {
                let mut runner = Runner {
                    stream,
                    max_pdu_length,
                    state: State::Idle,
                    shared_state: thread_state,
                    kill: thread_kill,
                    timer: ArtimTimer::new(artim_timeout),
                    from_user: to_provider_rx,
                    to_user: from_provider_tx,
                    is_requestor,
                    incoming: None,
                    pending_user_message: None,
                    outgoing_associate_rq,
                    access_control,
                };
                runner.run();
            })
            .expect("failed to spawn DUL provider thread");

        DulProvider {
            to_provider: to_provider_tx,
            from_provider: from_provider_rx,
            peeked: Mutex::new(None),
            state,
            kill,
            join_handle: Some(join_handle),
        }
    }

    /// Send a primitive to the association's peer.
    pub fn send(&self, message: ToProvider) -> Result<()> {
        self.to_provider
            .send(message)
            .map_err(|_| Error::ProviderStopped)
    }

    /// Block until the next indication or confirmation arrives.
    pub fn receive(&self) -> Result<FromProvider> {
        if let Some(msg) = self.peeked.lock().unwrap().take() {
            return Ok(msg);
        }
        self.from_provider
            .recv()
            .map_err(|_| Error::ProviderStopped)
    }

    /// Block up to `timeout` for the next indication or confirmation.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<Option<FromProvider>> {
        if let Some(msg) = self.peeked.lock().unwrap().take() {
            return Ok(Some(msg));
        }
        match self.from_provider.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ProviderStopped),
        }
    }

    /// Non-destructively look at the next pending indication or confirmation.
    pub fn peek(&self) -> Result<Option<FromProvider>> {
        let mut slot = self.peeked.lock().unwrap();
        if slot.is_none() {
            match self.from_provider.try_recv() {
                Ok(msg) => *slot = Some(msg),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(Error::ProviderStopped),
            }
        }
        Ok(slot.clone())
    }

    /// Request a clean shutdown. Succeeds only while the machine is in
    /// Sta1 (idle, no association); returns `false` otherwise.
    pub fn stop(&self) -> bool {
        if *self.state.lock().unwrap() == State::Idle {
            self.kill.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Terminate the loop immediately, regardless of state. No PDU is sent.
    pub fn kill(&self) {
        self.kill.store(true, Ordering::SeqCst);
    }
}

impl Drop for DulProvider {
    fn drop(&mut self) {
        self.kill.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

struct Runner {
    stream: TcpStream,
    max_pdu_length: u32,
    state: State,
    shared_state: Arc<Mutex<State>>,
    kill: Arc<AtomicBool>,
    timer: ArtimTimer,
    from_user: Receiver<ToProvider>,
    to_user: Sender<FromProvider>,
    is_requestor: bool,
    /// The PDU that triggered the event currently being dispatched, if any.
    incoming: Option<Pdu>,
    /// The user message that triggered the event currently being
    /// dispatched, if any.
    pending_user_message: Option<ToProvider>,
    /// The A-ASSOCIATE-RQ to send once the transport connection is
    /// confirmed, requestor side only.
    outgoing_associate_rq: Option<AssociationRQ>,
    access_control: Arc<dyn AccessControl>,
}

impl Runner {
    fn run(&mut self) {
        self.stream
            .set_read_timeout(Some(POLL_INTERVAL))
            .expect("setting a read timeout on a connected stream cannot fail");

        if self.is_requestor {
            self.state = State::AwaitingTransportConnection;
            self.dispatch(Event::TransportConnectConfirm);
        } else {
            self.state = State::Idle;
            self.dispatch(Event::TransportConnectIndication);
        }

        loop {
            if self.kill.load(Ordering::SeqCst) {
                break;
            }

            if self.state == State::AwaitingClose {
                if self.drain_until_closed() {
                    self.dispatch(Event::TransportClosed);
                }
                break;
            }

            match self.poll_network() {
                NetworkPoll::Event(event) => {
                    self.dispatch(event);
                    continue;
                }
                NetworkPoll::Closed => {
                    self.dispatch(Event::TransportClosed);
                    break;
                }
                NetworkPoll::Idle => {}
            }

            match self.from_user.try_recv() {
                Ok(message) => {
                    let event = Self::event_for_user_message(&message);
                    self.pending_user_message = Some(message);
                    self.dispatch(event);
                    continue;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => break,
            }

            if self.timer.is_expired() {
                self.dispatch(Event::ArtimExpired);
            }
        }
    }

    fn poll_network(&mut self) -> NetworkPoll {
        let mut probe = [0u8; 1];
        match self.stream.peek(&mut probe) {
            Ok(0) => NetworkPoll::Closed,
            Ok(_) => match read_pdu(&mut self.stream, self.max_pdu_length, false) {
                Ok(pdu) => {
                    let event = fsm::event_for_pdu(&pdu);
                    self.incoming = Some(pdu);
                    NetworkPoll::Event(event)
                }
                Err(e) => {
                    warn!(error = %e, "discarding unreadable PDU");
                    NetworkPoll::Event(Event::InvalidPdu)
                }
            },
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                NetworkPoll::Idle
            }
            Err(_) => NetworkPoll::Closed,
        }
    }

    /// Wait for the peer to close the connection, as Sta13 requires.
    fn drain_until_closed(&mut self) -> bool {
        let mut probe = [0u8; 1];
        match self.stream.peek(&mut probe) {
            Ok(0) => true,
            Ok(_) => {
                let mut sink = [0u8; 4096];
                let _ = self.stream.read(&mut sink);
                false
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                false
            }
            Err(_) => true,
        }
    }

    fn event_for_user_message(message: &ToProvider) -> Event {
        match message {
            ToProvider::AssociateResponse(AssociateResult::Accept(_)) => {
                Event::AssociateResponseAccept
            }
            ToProvider::AssociateResponse(AssociateResult::Reject(_)) => {
                Event::AssociateResponseReject
            }
            ToProvider::PData(_) => Event::PDataRequest,
            ToProvider::ReleaseRequest => Event::ReleaseRequest,
            ToProvider::ReleaseResponse => Event::ReleaseResponse,
            ToProvider::AbortRequest => Event::AbortRequest,
        }
    }

    fn dispatch(&mut self, event: Event) {
        let action = fsm::lookup(event, self.state).unwrap_or(Action::Aa8);
        debug!(?event, state = self.state.description(), ?action, "DUL transition");
        let previous = self.state;
        self.state = self.perform(action);
        self.incoming = None;
        self.pending_user_message = None;
        *self.shared_state.lock().unwrap() = self.state;
        if previous != State::DataTransfer && self.state == State::DataTransfer {
            info!("association established");
        } else if previous != State::Idle && self.state == State::Idle {
            info!("association ended");
        }
    }

    /// Carry out `action`, returning the state the machine transitions to.
    ///
    /// Mirrors the per-action functions of the standard's state tables
    /// (AE-1 through AA-8). AE-6's next state depends on the local
    /// acceptance decision and AR-8's depends on association role; both
    /// are resolved here rather than in the static transition table.
    fn perform(&mut self, action: Action) -> State {
        use Action::*;
        match action {
            Ae1 | Ae2 => {
                if let Some(rq) = self.outgoing_associate_rq.take() {
                    self.write_pdu(&Pdu::AssociationRQ(rq));
                }
                State::AwaitingAssociateResponse
            }
            Ae3 => {
                if let Some(Pdu::AssociationAC(ac)) = self.incoming.take() {
                    let _ = self.to_user.send(FromProvider::AssociateConfirmAccept(ac));
                }
                State::DataTransfer
            }
            Ae4 => {
                if let Some(Pdu::AssociationRJ(rj)) = self.incoming.take() {
                    let _ = self.to_user.send(FromProvider::AssociateConfirmReject(rj));
                }
                self.close_socket();
                State::Idle
            }
            Ae5 => {
                self.timer.start();
                State::AwaitingAssociateRq
            }
            Ae6 => {
                self.timer.stop();
                if let Some(Pdu::AssociationRQ(rq)) = self.incoming.take() {
                    match self.access_control.evaluate(&rq) {
                        AccessDecision::Accept => {
                            let _ = self.to_user.send(FromProvider::AssociateIndication(rq));
                            return State::AwaitingLocalAssociateResponse;
                        }
                        AccessDecision::Reject(rj) => {
                            self.write_pdu(&Pdu::AssociationRJ(rj));
                            self.timer.start();
                            return State::AwaitingClose;
                        }
                    }
                }
                State::AwaitingLocalAssociateResponse
            }
            Ae7 => {
                if let Some(ToProvider::AssociateResponse(AssociateResult::Accept(ac))) =
                    self.pending_user_message.take()
                {
                    self.write_pdu(&Pdu::AssociationAC(ac));
                }
                State::DataTransfer
            }
            Ae8 => {
                if let Some(ToProvider::AssociateResponse(AssociateResult::Reject(rj))) =
                    self.pending_user_message.take()
                {
                    self.write_pdu(&Pdu::AssociationRJ(rj));
                }
                self.timer.start();
                State::AwaitingClose
            }
            Dt1 => {
                if let Some(ToProvider::PData(data)) = self.pending_user_message.take() {
                    self.write_pdu(&Pdu::PData { data });
                }
                State::DataTransfer
            }
            Dt2 => {
                if let Some(Pdu::PData { data }) = self.incoming.take() {
                    let _ = self.to_user.send(FromProvider::PData(data));
                }
                State::DataTransfer
            }
            Ar1 => {
                self.write_pdu(&Pdu::ReleaseRQ);
                State::AwaitingReleaseRp
            }
            Ar2 => {
                let _ = self.incoming.take();
                let _ = self.to_user.send(FromProvider::ReleaseIndication);
                State::AwaitingLocalReleaseResponse
            }
            Ar3 => {
                let _ = self.incoming.take();
                let _ = self.to_user.send(FromProvider::ReleaseConfirm);
                self.close_socket();
                State::Idle
            }
            Ar4 => {
                self.write_pdu(&Pdu::ReleaseRP);
                self.timer.start();
                State::AwaitingClose
            }
            Ar5 => {
                self.timer.stop();
                self.close_socket();
                State::Idle
            }
            Ar6 => {
                if let Some(Pdu::PData { data }) = self.incoming.take() {
                    let _ = self.to_user.send(FromProvider::PData(data));
                }
                State::AwaitingReleaseRp
            }
            Ar7 => {
                if let Some(ToProvider::PData(data)) = self.pending_user_message.take() {
                    self.write_pdu(&Pdu::PData { data });
                }
                State::AwaitingLocalReleaseResponse
            }
            Ar8 => {
                let _ = self.incoming.take();
                let _ = self.to_user.send(FromProvider::ReleaseIndication);
                if self.is_requestor {
                    State::ReleaseCollisionRequestorAwaitingResponse
                } else {
                    State::ReleaseCollisionAcceptorAwaitingReleaseRp
                }
            }
            Ar9 => {
                self.write_pdu(&Pdu::ReleaseRP);
                State::ReleaseCollisionRequestorAwaitingReleaseRp
            }
            Ar10 => {
                let _ = self.incoming.take();
                let _ = self.to_user.send(FromProvider::ReleaseConfirm);
                State::ReleaseCollisionAcceptorAwaitingResponse
            }
            Aa1 => {
                self.write_pdu(&Pdu::AbortRQ {
                    source: AbortRQSource::ServiceUser,
                });
                self.timer.restart();
                State::AwaitingClose
            }
            Aa2 => {
                self.timer.stop();
                self.close_socket();
                State::Idle
            }
            Aa3 => {
                if let Some(Pdu::AbortRQ { source }) = self.incoming.take() {
                    let _ = self.to_user.send(FromProvider::AbortIndication(source));
                }
                self.close_socket();
                State::Idle
            }
            Aa4 => {
                let _ = self.to_user.send(FromProvider::AbortIndication(
                    AbortRQSource::ServiceProvider(
                        AbortRQServiceProviderReason::ReasonNotSpecifiedUnrecognizedPDU,
                    ),
                ));
                self.close_socket();
                State::Idle
            }
            Aa5 => {
                self.timer.stop();
                self.close_socket();
                State::Idle
            }
            Aa6 => {
                let _ = self.incoming.take();
                State::AwaitingClose
            }
            Aa7 => {
                let _ = self.incoming.take();
                self.write_pdu(&Pdu::AbortRQ {
                    source: AbortRQSource::ServiceProvider(AbortRQServiceProviderReason::UnexpectedPDU),
                });
                State::AwaitingClose
            }
            Aa8 => {
                let _ = self.incoming.take();
                self.write_pdu(&Pdu::AbortRQ {
                    source: AbortRQSource::ServiceProvider(
                        AbortRQServiceProviderReason::ReasonNotSpecifiedUnrecognizedPDU,
                    ),
                });
                let _ = self.to_user.send(FromProvider::AbortIndication(
                    AbortRQSource::ServiceProvider(
                        AbortRQServiceProviderReason::ReasonNotSpecifiedUnrecognizedPDU,
                    ),
                ));
                self.timer.start();
                State::AwaitingClose
            }
        }
    }

    fn write_pdu(&mut self, pdu: &Pdu) {
        if let Err(e) = write_pdu(&mut self.stream, pdu) {
            warn!(error = %e, "failed to write PDU to peer");
        }
    }

    fn close_socket(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

enum NetworkPoll {
    Event(Event),
    Idle,
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn requestor_sends_associate_rq_on_connect() {
        let (client, mut server) = connected_pair();
        let request = AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "SCU".to_string(),
            called_ae_title: "SCP".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![],
            user_variables: vec![],
        };
        let provider = DulProvider::for_requestor(
            client,
            request,
            crate::pdu::DEFAULT_MAX_PDU,
            Duration::from_secs(5),
        );

        let pdu = read_pdu(&mut server, crate::pdu::DEFAULT_MAX_PDU, true).unwrap();
        assert!(matches!(pdu, Pdu::AssociationRQ(_)));
        drop(provider);
    }

    #[test]
    fn acceptor_reports_incoming_associate_rq() {
        let (mut client, server) = connected_pair();
        let provider = DulProvider::for_acceptor(
            server,
            crate::pdu::DEFAULT_MAX_PDU,
            Duration::from_secs(5),
            Arc::new(AcceptAny),
        );

        let request = AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "SCU".to_string(),
            called_ae_title: "SCP".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![],
            user_variables: vec![],
        };
        write_pdu(&mut client, &Pdu::AssociationRQ(request)).unwrap();

        match provider.receive_timeout(Duration::from_secs(2)).unwrap() {
            Some(FromProvider::AssociateIndication(rq)) => {
                assert_eq!(rq.calling_ae_title, "SCU");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn access_control_rejects_unrecognized_called_ae_title() {
        let (mut client, server) = connected_pair();
        let access_control = Arc::new(AcceptCalledAeTitle {
            ae_title: "EXPECTED".to_string(),
        });
        let provider = DulProvider::for_acceptor(
            server,
            crate::pdu::DEFAULT_MAX_PDU,
            Duration::from_secs(5),
            access_control,
        );

        let request = AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "SCU".to_string(),
            called_ae_title: "SOMEONE-ELSE".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![],
            user_variables: vec![],
        };
        write_pdu(&mut client, &Pdu::AssociationRQ(request)).unwrap();

        let rj = read_pdu(&mut client, crate::pdu::DEFAULT_MAX_PDU, true).unwrap();
        assert!(matches!(rj, Pdu::AssociationRJ(_)));
        drop(provider);
    }
}
