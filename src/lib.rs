//! This crate contains the types and methods needed to interact
//! with DICOM nodes through the upper layer protocol.
//!
//! This crate can be used as a base
//! for finite-state machines and higher-level helpers,
//! enabling the creation of concrete service class users (SCUs)
//! and service class providers (SCPs).
//!
//! - The [`address`] module
//!   provides an abstraction for working with compound addresses
//!   referring to application entities in a network.
//! - The [`pdu`] module
//!   provides data structures representing _protocol data units_,
//!   which are passed around as part of the DICOM network communication support.
//! - The [`fsm`] module
//!   implements the upper layer state machine described in the standard,
//!   independently of any transport.
//! - The [`timer`] module
//!   provides the ARTIM timer used by the state machine to detect an
//!   unresponsive peer.
//! - The [`dul`] module
//!   drives [`fsm`] against a connected TCP stream on its own thread,
//!   exposing the provider's primitives through channels.
//! - The [`dimse`] module
//!   frames DIMSE command/data-set messages over a DUL provider.
//! - The [`association`] module
//!   comprises abstractions for establishing and negotiating associations
//!   between application entities,
//!   via the upper layer protocol by TCP.
//! - The [`ae`] module
//!   ties a listening socket, a SOP class registry and the DUL/ACSE/DIMSE
//!   layers together into a runnable application entity.

pub mod address;
pub mod ae;
pub mod association;
pub mod dimse;
pub mod dul;
pub mod fsm;
pub mod pdu;
pub mod timer;

/// The current implementation class UID generically referring to this
/// upper layer implementation.
///
/// Automatically generated as per the standard, part 5, section B.2.
///
/// This UID may change in future versions, even between patch versions.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.156227610253341005307660858504280353500";

/// The current implementation version name generically referring to this
/// upper layer implementation.
///
/// This name may change in future versions, even between patch versions.
pub const IMPLEMENTATION_VERSION_NAME: &str = "DICOM-UL-RS 0.1.0";

// re-exports

pub use address::{AeAddr, FullAeAddr};
pub use ae::AE;
pub use association::client::ClientAssociationOptions;
pub use association::server::ServerAssociationOptions;
pub use association::Association;
pub use pdu::read_pdu;
pub use pdu::write_pdu;
pub use pdu::Pdu;
