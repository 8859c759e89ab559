//! Application entity.
//!
//! Ties the listening socket, the supported SOP-class/transfer-syntax
//! lists, and the user's callbacks together into a running node that can
//! both accept associations (service class provider) and request them
//! (service class user). [`AE`] is a consuming builder; [`AE::start`]
//! spawns the accept loop and returns an [`AeHandle`] the caller keeps
//! around to request outgoing associations or shut the node down.

use std::io;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use tracing::{debug, warn};

use crate::association::client::{self, ClientAssociationOptions};
use crate::association::server::ServerAssociationOptions;
use crate::association::runtime::{self, DimseResponse, HandlerRegistry, SopClassHandler};
use crate::association::Association;
use crate::dimse::DimseMessage;
use crate::pdu::commands::{Command, CommandField};
use crate::pdu::generated::{CEchoRsp, CFindRsp, CGetRsp, CMoveRsp, CStoreRsp};
use crate::pdu::DEFAULT_MAX_PDU;

/// A complete query/retrieve match: one dataset to report before the
/// terminal status of a C-FIND/C-GET/C-MOVE exchange.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub data_set: Vec<u8>,
}

/// Status returned when no SOP class is registered for an abstract syntax.
const STATUS_SOP_CLASS_NOT_SUPPORTED: u16 = 0x0122;

pub type AssociateRequestCallback = Arc<dyn Fn(&Association) + Send + Sync>;
pub type AssociateResponseCallback = Arc<dyn Fn(&Association) + Send + Sync>;
pub type EchoCallback = Arc<dyn Fn(&Association, &DimseMessage) -> u16 + Send + Sync>;
pub type StoreCallback = Arc<dyn Fn(&Association, &DimseMessage) -> u16 + Send + Sync>;
pub type QueryCallback = Arc<dyn Fn(&Association, &DimseMessage) -> Vec<QueryMatch> + Send + Sync>;

fn default_transfer_syntaxes() -> Vec<String> {
    vec![
        "1.2.840.10008.1.2.1".to_string(), // Explicit VR Little Endian
        "1.2.840.10008.1.2".to_string(),   // Implicit VR Little Endian
        "1.2.840.10008.1.2.2".to_string(), // Explicit VR Big Endian
    ]
}

fn string_element(command: &InMemDicomObject, tag: dicom_core::Tag) -> Option<String> {
    command
        .get(tag)
        .and_then(|e| e.value().to_str().ok())
        .map(|s| s.trim_end_matches(['\0', ' ']).to_string())
}

fn encode_or_log(command: &impl Command, ds_included: bool) -> Option<Vec<u8>> {
    match command.encode(ds_included) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("failed to encode DIMSE response: {}", e);
            None
        }
    }
}

/// Adapts the AE's named callbacks to the [`SopClassHandler`] interface
/// expected by the association runtime; the same instance is registered
/// under every accepted SCP SOP class, dispatching on the command field
/// rather than the class itself.
struct CallbackHandler {
    on_receive_echo: Option<EchoCallback>,
    on_receive_store: Option<StoreCallback>,
    on_receive_find: Option<QueryCallback>,
    on_receive_move: Option<QueryCallback>,
    on_receive_get: Option<QueryCallback>,
}

impl CallbackHandler {
    fn query_responses<F>(
        &self,
        association: &Association,
        request: &DimseMessage,
        callback: Option<&QueryCallback>,
        build_pending: F,
        build_final: impl Fn(usize) -> Option<Vec<u8>>,
    ) -> Vec<DimseResponse>
    where
        F: Fn(usize, usize) -> Option<Vec<u8>>,
    {
        let matches = callback
            .map(|cb| cb(association, request))
            .unwrap_or_default();
        let total = matches.len();
        let mut responses = Vec::with_capacity(total + 1);
        for (i, m) in matches.into_iter().enumerate() {
            if let Some(command_bytes) = build_pending(i, total) {
                responses.push(DimseResponse {
                    command_bytes,
                    data_set: Some(m.data_set),
                });
            }
        }
        if let Some(command_bytes) = build_final(total) {
            responses.push(DimseResponse {
                command_bytes,
                data_set: None,
            });
        }
        responses
    }
}

impl SopClassHandler for CallbackHandler {
    fn scp(&self, association: &Association, request: &DimseMessage) -> Vec<DimseResponse> {
        let message_id = request.message_id().unwrap_or(0);
        let affected_sop_class_uid =
            string_element(&request.command, tags::AFFECTED_SOP_CLASS_UID).unwrap_or_default();

        if request.command_field == CommandField::C_ECHO_RQ as u16 {
            let status = self
                .on_receive_echo
                .as_ref()
                .map(|cb| cb(association, request))
                .unwrap_or(runtime::STATUS_SUCCESS);
            let rsp = CEchoRsp::builder()
                .message_id_being_responded_to(message_id)
                .affected_sop_class_uid(affected_sop_class_uid.as_str())
                .status(status)
                .build();
            return encode_or_log(&rsp, false)
                .map(|command_bytes| {
                    vec![DimseResponse {
                        command_bytes,
                        data_set: None,
                    }]
                })
                .unwrap_or_default();
        }

        if request.command_field == CommandField::C_STORE_RQ as u16 {
            let affected_sop_instance_uid =
                string_element(&request.command, tags::AFFECTED_SOP_INSTANCE_UID)
                    .unwrap_or_default();
            let status = self
                .on_receive_store
                .as_ref()
                .map(|cb| cb(association, request))
                .unwrap_or(STATUS_SOP_CLASS_NOT_SUPPORTED);
            let rsp = CStoreRsp::builder()
                .message_id_being_responded_to(message_id)
                .affected_sop_class_uid(affected_sop_class_uid.as_str())
                .affected_sop_instance_uid(affected_sop_instance_uid.as_str())
                .status(status)
                .build();
            return encode_or_log(&rsp, false)
                .map(|command_bytes| {
                    vec![DimseResponse {
                        command_bytes,
                        data_set: None,
                    }]
                })
                .unwrap_or_default();
        }

        if request.command_field == CommandField::C_FIND_RQ as u16 {
            return self.query_responses(
                association,
                request,
                self.on_receive_find.as_ref(),
                |_, _| {
                    let rsp = CFindRsp::builder()
                        .message_id_being_responded_to(message_id)
                        .status(runtime::STATUS_PENDING)
                        .build();
                    encode_or_log(&rsp, true)
                },
                |_| {
                    let rsp = CFindRsp::builder()
                        .message_id_being_responded_to(message_id)
                        .status(runtime::STATUS_SUCCESS)
                        .build();
                    encode_or_log(&rsp, false)
                },
            );
        }

        if request.command_field == CommandField::C_MOVE_RQ as u16 {
            return self.query_responses(
                association,
                request,
                self.on_receive_move.as_ref(),
                |i, total| {
                    let rsp = CMoveRsp::builder()
                        .message_id_being_responded_to(message_id)
                        .status(runtime::STATUS_PENDING)
                        .number_of_remaining_suboperations((total - i - 1) as u16)
                        .number_of_completed_suboperations(i as u16)
                        .build();
                    encode_or_log(&rsp, true)
                },
                |total| {
                    let rsp = CMoveRsp::builder()
                        .message_id_being_responded_to(message_id)
                        .status(runtime::STATUS_SUCCESS)
                        .number_of_completed_suboperations(total as u16)
                        .build();
                    encode_or_log(&rsp, false)
                },
            );
        }

        if request.command_field == CommandField::C_GET_RQ as u16 {
            return self.query_responses(
                association,
                request,
                self.on_receive_get.as_ref(),
                |i, total| {
                    let rsp = CGetRsp::builder()
                        .message_id_being_responded_to(message_id)
                        .status(runtime::STATUS_PENDING)
                        .number_of_remaining_suboperations((total - i - 1) as u16)
                        .number_of_completed_suboperations(i as u16)
                        .build();
                    encode_or_log(&rsp, true)
                },
                |total| {
                    let rsp = CGetRsp::builder()
                        .message_id_being_responded_to(message_id)
                        .status(runtime::STATUS_SUCCESS)
                        .number_of_completed_suboperations(total as u16)
                        .build();
                    encode_or_log(&rsp, false)
                },
            );
        }

        Vec::new()
    }
}

struct AeConfig {
    ae_title: String,
    scu_sop_classes: Vec<String>,
    scp_sop_classes: Vec<String>,
    transfer_syntaxes: Vec<String>,
    max_pdu_length: u32,
    on_associate_request: Option<AssociateRequestCallback>,
    on_associate_response: Option<AssociateResponseCallback>,
    on_receive_echo: Option<EchoCallback>,
    on_receive_store: Option<StoreCallback>,
    on_receive_find: Option<QueryCallback>,
    on_receive_move: Option<QueryCallback>,
    on_receive_get: Option<QueryCallback>,
}

impl AeConfig {
    fn server_options(&self) -> ServerAssociationOptions {
        let mut options = ServerAssociationOptions::new()
            .ae_title(self.ae_title.clone())
            .max_pdu_length(self.max_pdu_length);
        for uid in &self.scp_sop_classes {
            options = options.with_abstract_syntax(uid.clone());
        }
        for ts in &self.transfer_syntaxes {
            options = options.with_transfer_syntax(ts.clone());
        }
        options
    }

    fn client_options(&self, called_ae_title: String) -> ClientAssociationOptions {
        let mut options = ClientAssociationOptions::new()
            .calling_ae_title(self.ae_title.clone())
            .called_ae_title(called_ae_title)
            .max_pdu_length(self.max_pdu_length);
        for uid in &self.scu_sop_classes {
            options = options.with_abstract_syntax(uid.clone());
        }
        for ts in &self.transfer_syntaxes {
            options = options.with_transfer_syntax(ts.clone());
        }
        options
    }

    fn registry(self: &Arc<Self>) -> HandlerRegistry {
        let handler: Arc<dyn SopClassHandler> = Arc::new(CallbackHandler {
            on_receive_echo: self.on_receive_echo.clone(),
            on_receive_store: self.on_receive_store.clone(),
            on_receive_find: self.on_receive_find.clone(),
            on_receive_move: self.on_receive_move.clone(),
            on_receive_get: self.on_receive_get.clone(),
        });
        self.scp_sop_classes
            .iter()
            .map(|uid| (uid.clone(), Arc::clone(&handler)))
            .collect()
    }
}

/// Builder for an application entity. Configure SOP classes, transfer
/// syntaxes and callbacks, then call [`start`](Self::start) to begin
/// listening.
pub struct AE {
    config: AeConfig,
    port: u16,
}

impl AE {
    /// Create a new application entity bound to `port`, supporting the
    /// given SCU and SCP SOP class UID lists.
    pub fn new(
        ae_title: impl Into<String>,
        port: u16,
        scu_sop_classes: Vec<String>,
        scp_sop_classes: Vec<String>,
    ) -> Self {
        AE {
            config: AeConfig {
                ae_title: ae_title.into(),
                scu_sop_classes,
                scp_sop_classes,
                transfer_syntaxes: default_transfer_syntaxes(),
                max_pdu_length: DEFAULT_MAX_PDU,
                on_associate_request: None,
                on_associate_response: None,
                on_receive_echo: None,
                on_receive_store: None,
                on_receive_find: None,
                on_receive_move: None,
                on_receive_get: None,
            },
            port,
        }
    }

    /// Override the list of transfer syntaxes offered/accepted for every
    /// SOP class. Defaults to Explicit VR LE, Implicit VR LE, Explicit VR BE.
    pub fn with_transfer_syntaxes(mut self, transfer_syntaxes: Vec<String>) -> Self {
        self.config.transfer_syntaxes = transfer_syntaxes;
        self
    }

    /// Override the maximum PDU length. Defaults to 16000.
    pub fn with_max_pdu_length(mut self, max_pdu_length: u32) -> Self {
        self.config.max_pdu_length = max_pdu_length;
        self
    }

    pub fn on_associate_request(
        mut self,
        callback: impl Fn(&Association) + Send + Sync + 'static,
    ) -> Self {
        self.config.on_associate_request = Some(Arc::new(callback));
        self
    }

    pub fn on_associate_response(
        mut self,
        callback: impl Fn(&Association) + Send + Sync + 'static,
    ) -> Self {
        self.config.on_associate_response = Some(Arc::new(callback));
        self
    }

    pub fn on_receive_echo(
        mut self,
        callback: impl Fn(&Association, &DimseMessage) -> u16 + Send + Sync + 'static,
    ) -> Self {
        self.config.on_receive_echo = Some(Arc::new(callback));
        self
    }

    pub fn on_receive_store(
        mut self,
        callback: impl Fn(&Association, &DimseMessage) -> u16 + Send + Sync + 'static,
    ) -> Self {
        self.config.on_receive_store = Some(Arc::new(callback));
        self
    }

    pub fn on_receive_find(
        mut self,
        callback: impl Fn(&Association, &DimseMessage) -> Vec<QueryMatch> + Send + Sync + 'static,
    ) -> Self {
        self.config.on_receive_find = Some(Arc::new(callback));
        self
    }

    pub fn on_receive_move(
        mut self,
        callback: impl Fn(&Association, &DimseMessage) -> Vec<QueryMatch> + Send + Sync + 'static,
    ) -> Self {
        self.config.on_receive_move = Some(Arc::new(callback));
        self
    }

    pub fn on_receive_get(
        mut self,
        callback: impl Fn(&Association, &DimseMessage) -> Vec<QueryMatch> + Send + Sync + 'static,
    ) -> Self {
        self.config.on_receive_get = Some(Arc::new(callback));
        self
    }

    /// Bind the listening socket (if any SCP SOP class is configured) and
    /// spawn the accept loop. An AE with no SCP SOP classes is a pure SCU
    /// and `start` returns a handle with no listener running.
    pub fn start(self) -> io::Result<AeHandle> {
        let config = Arc::new(self.config);
        let quit = Arc::new(AtomicBool::new(false));
        let associations = Arc::new(Mutex::new(Vec::new()));

        let mut bound_port = self.port;
        let accept_thread = if config.scp_sop_classes.is_empty() {
            None
        } else {
            let listener = TcpListener::bind(("0.0.0.0", self.port))?;
            bound_port = listener.local_addr()?.port();
            listener.set_nonblocking(true)?;
            let accept_config = Arc::clone(&config);
            let accept_quit = Arc::clone(&quit);
            let accept_associations = Arc::clone(&associations);
            Some(
                std::thread::Builder::new()
                    .name(format!("ae-accept-{}", accept_config.ae_title))
                    .spawn(move || {
                        accept_loop(listener, accept_config, accept_quit, accept_associations);
                    })
                    .expect("failed to spawn AE accept thread"),
            )
        };

        Ok(AeHandle {
            config,
            port: bound_port,
            quit,
            accept_thread,
            associations,
        })
    }
}

fn accept_loop(
    listener: TcpListener,
    config: Arc<AeConfig>,
    quit: Arc<AtomicBool>,
    associations: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    while !quit.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                if let Err(e) = stream.set_nonblocking(false) {
                    warn!("failed to configure accepted socket: {}", e);
                    continue;
                }
                let handler_config = Arc::clone(&config);
                let handle = std::thread::Builder::new()
                    .name("dul-association".to_string())
                    .spawn(move || serve_connection(stream, handler_config))
                    .expect("failed to spawn association thread");
                associations.lock().unwrap().push(handle);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => {
                warn!("accept failed: {}", e);
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

fn serve_connection(stream: TcpStream, config: Arc<AeConfig>) {
    let options = config.server_options();
    let association = match options.accept(stream) {
        Ok(association) => association,
        Err(e) => {
            debug!("incoming association not established: {}", e);
            return;
        }
    };

    if let Some(callback) = &config.on_associate_request {
        callback(&association);
    }

    let registry = config.registry();
    if let Err(e) = runtime::serve(&association, &registry) {
        warn!("association ended with an error: {}", e);
    }
}

/// A running application entity. Dropping this does not stop the accept
/// loop; call [`quit`](Self::quit) for a clean shutdown.
pub struct AeHandle {
    config: Arc<AeConfig>,
    port: u16,
    quit: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
    associations: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl AeHandle {
    /// The port this node is listening on, if it accepts associations.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Request an association with a peer, blocking until it is
    /// established or refused.
    pub fn request_association<A: ToSocketAddrs>(
        &self,
        address: A,
        called_ae_title: impl Into<String>,
    ) -> client::Result<Association> {
        let association = self.config.client_options(called_ae_title.into()).establish(address)?;
        if let Some(callback) = &self.config.on_associate_response {
            callback(&association);
        }
        Ok(association)
    }

    /// Stop the accept loop and let in-flight associations finish on
    /// their own; does not forcibly terminate them.
    pub fn quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    /// Wait for the accept loop and every spawned association thread to
    /// finish.
    pub fn join(mut self) {
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
        let handles = std::mem::take(&mut *self.associations.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
    }
}
