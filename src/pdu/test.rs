use crate::pdu::reader::*;
use crate::pdu::writer::*;
use crate::pdu::*;
use std::io::Cursor;

#[test]
fn can_read_write_associate_rq() {
    let association_rq = Pdu::AssociationRQ(AssociationRQ {
        protocol_version: 2,
        calling_ae_title: "calling ae".to_string(),
        called_ae_title: "called ae".to_string(),
        application_context_name: "application context name".to_string(),
        presentation_contexts: vec![
            PresentationContextProposed {
                id: 1,
                abstract_syntax: "abstract 1".to_string(),
                transfer_syntaxes: vec!["transfer 1".to_string(), "transfer 2".to_string()],
            },
            PresentationContextProposed {
                id: 3,
                abstract_syntax: "abstract 2".to_string(),
                transfer_syntaxes: vec!["transfer 3".to_string(), "transfer 4".to_string()],
            },
        ],
        user_variables: vec![
            UserVariableItem::ImplementationClassUID("class uid".to_string()),
            UserVariableItem::ImplementationVersionName("version name".to_string()),
            UserVariableItem::MaxLength(23),
            UserVariableItem::AsynchronousOperationsWindow {
                max_operations_invoked: 1,
                max_operations_performed: 1,
            },
            UserVariableItem::ScpScuRoleSelection(RoleSelection {
                sop_class_uid: "1.2.3.4".to_string(),
                scu_role: true,
                scp_role: false,
            }),
        ],
    });

    let mut bytes = vec![0u8; 0];
    write_pdu(&mut bytes, &association_rq).unwrap();

    let result = read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU, true).unwrap();

    match result {
        Pdu::AssociationRQ(AssociationRQ {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        }) => {
            assert_eq!(protocol_version, 2);
            assert_eq!(calling_ae_title, "calling ae");
            assert_eq!(called_ae_title, "called ae");
            assert_eq!(application_context_name, "application context name");
            assert_eq!(presentation_contexts.len(), 2);
            assert_eq!(presentation_contexts[0].abstract_syntax, "abstract 1");
            assert_eq!(presentation_contexts[0].transfer_syntaxes.len(), 2);
            assert_eq!(presentation_contexts[0].transfer_syntaxes[0], "transfer 1");
            assert_eq!(presentation_contexts[0].transfer_syntaxes[1], "transfer 2");
            assert_eq!(presentation_contexts[1].abstract_syntax, "abstract 2");
            assert_eq!(presentation_contexts[1].transfer_syntaxes.len(), 2);
            assert_eq!(user_variables.len(), 5);
            assert!(matches!(
                user_variables[0],
                UserVariableItem::ImplementationClassUID(_)
            ));
            assert!(matches!(
                user_variables[1],
                UserVariableItem::ImplementationVersionName(_)
            ));
            assert!(matches!(user_variables[2], UserVariableItem::MaxLength(23)));
            assert!(matches!(
                user_variables[3],
                UserVariableItem::AsynchronousOperationsWindow {
                    max_operations_invoked: 1,
                    max_operations_performed: 1,
                }
            ));
            assert!(matches!(
                &user_variables[4],
                UserVariableItem::ScpScuRoleSelection(role) if role.scu_role && !role.scp_role
            ));
        }
        other => panic!("unexpected PDU: {:?}", other),
    }
}

#[test]
fn can_read_write_pdata() {
    let pdata_rq = Pdu::PData {
        data: vec![PDataValue {
            presentation_context_id: 3,
            value_type: PDataValueType::Command,
            is_last: true,
            data: vec![0, 0, 0, 0],
        }],
    };

    let mut bytes = vec![0u8; 0];
    write_pdu(&mut bytes, &pdata_rq).unwrap();

    let result = read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU, true).unwrap();

    match result {
        Pdu::PData { data } => {
            assert_eq!(data.len(), 1);
            assert_eq!(data[0].presentation_context_id, 3);
            assert!(matches!(data[0].value_type, PDataValueType::Command));
            assert!(data[0].is_last);
            assert_eq!(data[0].data, vec![0, 0, 0, 0]);
        }
        other => panic!("unexpected PDU: {:?}", other),
    }
}

#[test]
fn can_read_write_associate_rj() {
    let rj = Pdu::AssociationRJ(AssociationRJ {
        result: AssociationRJResult::Permanent,
        source: AssociationRJSource::ServiceUser(
            AssociationRJServiceUserReason::CalledAETitleNotRecognized,
        ),
    });

    let mut bytes = vec![];
    write_pdu(&mut bytes, &rj).unwrap();
    let result = read_pdu(&mut Cursor::new(&bytes), DEFAULT_MAX_PDU, true).unwrap();

    match result {
        Pdu::AssociationRJ(AssociationRJ { result, source }) => {
            assert!(matches!(result, AssociationRJResult::Permanent));
            assert!(matches!(
                source,
                AssociationRJSource::ServiceUser(
                    AssociationRJServiceUserReason::CalledAETitleNotRecognized
                )
            ));
        }
        other => panic!("unexpected PDU: {:?}", other),
    }
}

#[test]
fn rejects_pdu_above_max_length_in_strict_mode() {
    let mut bytes = vec![0x04, 0x00, 0x00, 0x01, 0x00, 0x00];
    bytes.resize(6 + 256, 0);
    let err = read_pdu(&mut Cursor::new(&bytes), MINIMUM_PDU_SIZE, true).unwrap_err();
    assert!(matches!(err, Error::PduTooLarge { .. }));
}
