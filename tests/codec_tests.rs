use pus_housekeeping::message::{MessageError, MAX_MESSAGE_SIZE};
use pus_housekeeping::parameter::{Parameter, ParameterError, ParameterKind, MAX_PARAMETER_SAMPLES};
use pus_housekeeping::*;

#[test]
fn test_fields_read_back_in_written_order() {
    let mut message = Message::telemetry(3, 10);
    message.append_u8(200).unwrap();
    message.append_bool(false).unwrap();
    message.append_u32(u32::MAX).unwrap();
    message.append_u16(513).unwrap();
    message.append_f32(-0.25).unwrap();

    assert_eq!(message.len(), 12);
    assert_eq!(message.read_u8().unwrap(), 200);
    assert!(!message.read_bool().unwrap());
    assert_eq!(message.read_u32().unwrap(), u32::MAX);
    assert_eq!(message.read_u16().unwrap(), 513);
    assert_eq!(message.read_f32().unwrap(), -0.25);
    assert_eq!(message.remaining(), 0);
}

#[test]
fn test_float_bit_pattern_preserved() {
    let mut message = Message::telemetry(3, 25);
    message.append_f32(f32::NAN).unwrap();

    assert_eq!(message.data(), &f32::NAN.to_be_bytes());
    assert!(message.read_f32().unwrap().is_nan());
}

#[test]
fn test_full_message_rejects_partial_write() {
    let mut message = Message::telemetry(3, 25);
    message.append_bytes(&[0; MAX_MESSAGE_SIZE - 1]).unwrap();

    assert_eq!(
        message.append_u16(1),
        Err(MessageError::TooLarge {
            requested: 2,
            available: 1
        })
    );
    message.append_u8(1).unwrap();
    assert_eq!(message.len(), MAX_MESSAGE_SIZE);
}

#[test]
fn test_parameter_written_from_message() {
    let mut catalog = ParameterCatalog::with_values([ParameterValue::U16(0), ParameterValue::F32(0.0)]).unwrap();
    let mut request = Message::telecommand(20, 3);
    request.append_u16(0xABCD).unwrap();
    request.append_f32(2.5).unwrap();

    catalog.get_mut(0).unwrap().set_from_message(&mut request).unwrap();
    catalog.get_mut(1).unwrap().set_from_message(&mut request).unwrap();

    assert_eq!(catalog.get(0).unwrap().get(), ParameterValue::U16(0xABCD));
    assert_eq!(catalog.get(1).unwrap().value_as_f64(), 2.5);
}

#[test]
fn test_parameter_append_uses_native_width() {
    let catalog = ParameterCatalog::with_values([
        ParameterValue::U8(1),
        ParameterValue::U16(2),
        ParameterValue::U32(3),
        ParameterValue::F32(1.0),
    ])
    .unwrap();

    let mut report = Message::telemetry(3, 25);
    for (_, parameter) in catalog.iter() {
        parameter.append_to_message(&mut report).unwrap();
    }

    assert_eq!(
        report.data(),
        &[1, 0, 2, 0, 0, 0, 3, 0x3F, 0x80, 0, 0]
    );
}

#[test]
fn test_catalog_set_checks_id_and_kind() {
    let mut catalog = ParameterCatalog::with_values([ParameterValue::U8(1)]).unwrap();

    assert_eq!(catalog.set(4, ParameterValue::U8(1)), Err(ParameterError::NotFound(4)));
    assert_eq!(
        catalog.set(0, ParameterValue::F32(1.0)),
        Err(ParameterError::KindMismatch {
            expected: ParameterKind::U8,
            found: ParameterKind::F32
        })
    );
    assert_eq!(catalog.set(0, ParameterValue::U8(9)), Ok(()));
}

#[test]
fn test_samples_are_independent_of_current_value() {
    let mut parameter = Parameter::new(ParameterValue::U32(100));
    parameter.store_sample(ParameterValue::U32(7)).unwrap();
    parameter.store_sample(ParameterValue::U32(8)).unwrap();

    let mut report = Message::telemetry(3, 25);
    parameter.append_sample_to_message(&mut report, 1).unwrap();
    parameter.append_to_message(&mut report).unwrap();

    assert_eq!(report.data(), &[0, 0, 0, 8, 0, 0, 0, 100]);
    assert_eq!(
        parameter.append_sample_to_message(&mut report, MAX_PARAMETER_SAMPLES),
        Err(ParameterError::NoSample(MAX_PARAMETER_SAMPLES))
    );

    parameter.clear_samples();
    assert_eq!(parameter.sample_count(), 0);
    assert_eq!(parameter.sample(0), None);
}
