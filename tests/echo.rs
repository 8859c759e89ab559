use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dicom_ul::ae::AE;
use dicom_ul::association::acse;
use dicom_ul::association::client::ClientAssociationOptions;
use dicom_ul::association::runtime;
use dicom_ul::pdu::commands::Command;
use dicom_ul::pdu::generated::CEchoRq;

const VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";
const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
const DIGITAL_MG_STORAGE_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.1.2";

/// A full C-ECHO round trip between a requestor and an [`AE`] acceptor,
/// mirroring ports 11112/11113 with AE titles ECHOSCP/ECHOSCU from an
/// unbound (port-0) listener so the test suite never collides on a real
/// port.
#[test]
fn echo_round_trip() {
    let echo_count = Arc::new(AtomicU16::new(0));
    let echo_count_scp = Arc::clone(&echo_count);

    let ae = AE::new(
        "ECHOSCP",
        0,
        vec![],
        vec![VERIFICATION_SOP_CLASS.to_string()],
    )
    .on_receive_echo(move |_association, _request| {
        echo_count_scp.fetch_add(1, Ordering::SeqCst);
        0x0000
    })
    .start()
    .expect("AE failed to start");

    let port = ae.port();

    let association = ClientAssociationOptions::new()
        .calling_ae_title("ECHOSCU")
        .called_ae_title("ECHOSCP")
        .with_abstract_syntax(VERIFICATION_SOP_CLASS)
        .with_transfer_syntax(IMPLICIT_VR_LE)
        .establish(("127.0.0.1", port))
        .expect("association should be established");

    let context = association
        .context_for_abstract_syntax(VERIFICATION_SOP_CLASS)
        .expect("verification context should be negotiated");

    let request = CEchoRq::builder()
        .message_id(1)
        .affected_sop_class_uid(VERIFICATION_SOP_CLASS)
        .build();
    let command_bytes = request.encode(false).expect("command should encode");

    let response = runtime::scu_request(&association, context.id, &command_bytes, None)
        .expect("echo exchange should succeed");

    assert_eq!(response.status(), Some(0x0000));
    assert_eq!(response.message_id_being_responded_to(), Some(1));

    // `release` only returns `Ok(())` on a genuine A-RELEASE-RP; an abort
    // received while waiting for it is a distinct error, so this also
    // verifies the acceptor completed AR-4 instead of dropping the
    // association from Sta8.
    acse::release(association.dul()).expect("peer should confirm the release, not abort");
    ae.quit();

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(echo_count.load(Ordering::SeqCst), 1);
}

/// An association request naming an abstract syntax the acceptor never
/// configured is still accepted at the ACSE level, but the corresponding
/// presentation context comes back rejected rather than negotiated.
#[test]
fn reject_unknown_abstract_syntax() {
    let ae = AE::new(
        "ECHOSCP",
        0,
        vec![],
        vec![VERIFICATION_SOP_CLASS.to_string()],
    )
    .start()
    .expect("AE failed to start");

    let port = ae.port();

    let association = ClientAssociationOptions::new()
        .calling_ae_title("ECHOSCU")
        .called_ae_title("ECHOSCP")
        .with_abstract_syntax(DIGITAL_MG_STORAGE_SOP_CLASS)
        .with_transfer_syntax(IMPLICIT_VR_LE)
        .establish(("127.0.0.1", port))
        .expect("association should still be established");

    assert!(association
        .context_for_abstract_syntax(DIGITAL_MG_STORAGE_SOP_CLASS)
        .is_none());
    assert!(association.presentation_contexts().is_empty());

    acse::abort(association.dul()).ok();
    ae.quit();
}
