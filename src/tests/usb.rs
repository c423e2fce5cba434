use crate::builder::{FilterBuilder, ParseError};
use crate::bxcan::BxcanF0;
use crate::device::Hardware;
use crate::mocks::MockUsb;
use crate::usb::{ControlRequest, FilterProgrammer, ProgramError};
use mockall::Sequence;

const FEATURE_FILTER: u32 = 1 << 16;

/// Queues a BT_CONST answer with the given feature word
fn expect_capability(usb: &mut MockUsb, feature: u32, seq: &mut Sequence) {
    usb.expect_control_in()
        .withf(|request, data| *request == ControlRequest::BtConst && data.len() == 40)
        .times(1)
        .returning(move |_, data| {
            data.fill(0);
            data[..4].copy_from_slice(&feature.to_le_bytes());
            Ok(data.len())
        })
        .in_sequence(seq);
}

/// Queues a GET_FILTER answer with the given device tag
fn expect_filter_info(usb: &mut MockUsb, tag: u8, seq: &mut Sequence) {
    usb.expect_control_in()
        .withf(|request, data| *request == ControlRequest::GetFilter && data.len() == 4)
        .times(1)
        .returning(move |_, data| {
            data.fill(0);
            data[0] = tag;
            Ok(data.len())
        })
        .in_sequence(seq);
}

#[test]
fn test_capability_record_decoding() {
    let mut usb = MockUsb::new();
    usb.expect_control_in()
        .withf(|request, data| *request == ControlRequest::BtConst && data.len() == 40)
        .times(1)
        .returning(|_, data| {
            for (i, chunk) in data.chunks_exact_mut(4).enumerate() {
                chunk.copy_from_slice(&(i as u32 + 1).to_le_bytes());
            }
            Ok(data.len())
        });

    let capability = FilterProgrammer::new(usb).capability().unwrap();
    assert_eq!(1, capability.feature);
    assert_eq!(2, capability.fclk_can);
    assert_eq!(3, capability.tseg1_min);
    assert_eq!(4, capability.tseg1_max);
    assert_eq!(5, capability.tseg2_min);
    assert_eq!(6, capability.tseg2_max);
    assert_eq!(7, capability.sjw_max);
    assert_eq!(8, capability.brp_min);
    assert_eq!(9, capability.brp_max);
    assert_eq!(10, capability.brp_inc);
    assert!(!capability.has_filter());
}

#[test]
fn test_has_hardware_filter() {
    let mut seq = Sequence::new();
    let mut usb = MockUsb::new();
    expect_capability(&mut usb, FEATURE_FILTER, &mut seq);
    expect_capability(&mut usb, 0, &mut seq);

    let mut programmer = FilterProgrammer::new(usb);
    assert!(programmer.has_hardware_filter().unwrap());
    assert!(!programmer.has_hardware_filter().unwrap());
}

#[test]
fn test_filter_hardware_lookup() {
    let mut seq = Sequence::new();
    let mut usb = MockUsb::new();
    expect_filter_info(&mut usb, 2, &mut seq);
    expect_filter_info(&mut usb, 9, &mut seq);

    let mut programmer = FilterProgrammer::new(usb);
    assert_eq!(Hardware::BxcanF4, programmer.filter_hardware().unwrap());
    assert_eq!(Err(ProgramError::UnknownHardware(9)), programmer.filter_hardware());
}

#[test]
fn test_program_ships_the_compiled_image() {
    let definition = "0x100 0x200 0x300 0x400, 0x500-0x50F";

    let mut reference = BxcanF0::new();
    reference.begin();
    reference.parse(definition).unwrap();
    reference.end().unwrap();
    let expected = reference.image();

    let mut seq = Sequence::new();
    let mut usb = MockUsb::new();
    expect_capability(&mut usb, FEATURE_FILTER, &mut seq);
    expect_filter_info(&mut usb, 1, &mut seq);

    usb.expect_control_out()
        .withf(move |request, data| {
            *request == ControlRequest::SetFilter && data.len() == 132 && data[0] == 1 && data == &expected[..]
        })
        .times(1)
        .returning(|_, data| Ok(data.len()))
        .in_sequence(&mut seq);

    let mut programmer = FilterProgrammer::new(usb);
    assert_eq!(Hardware::BxcanF0, programmer.program(definition).unwrap());
}

#[test]
fn test_program_rejects_device_without_filter() {
    let mut seq = Sequence::new();
    let mut usb = MockUsb::new();
    expect_capability(&mut usb, 0, &mut seq);

    let mut programmer = FilterProgrammer::new(usb);
    assert_eq!(Err(ProgramError::NoHardwareFilter), programmer.program("0x100"));
}

#[test]
fn test_program_rejects_unknown_family() {
    let mut seq = Sequence::new();
    let mut usb = MockUsb::new();
    expect_capability(&mut usb, FEATURE_FILTER, &mut seq);
    expect_filter_info(&mut usb, 0, &mut seq);

    let mut programmer = FilterProgrammer::new(usb);
    assert_eq!(Err(ProgramError::UnknownHardware(0)), programmer.program("0x100"));
}

#[test]
fn test_program_rejects_bad_syntax_before_any_transfer_out() {
    let mut seq = Sequence::new();
    let mut usb = MockUsb::new();
    expect_capability(&mut usb, FEATURE_FILTER, &mut seq);
    expect_filter_info(&mut usb, 3, &mut seq);

    let mut programmer = FilterProgrammer::new(usb);
    assert_eq!(
        Err(ProgramError::Parse(ParseError::Syntax { pos: 0 })),
        programmer.program("zzz")
    );
}

#[test]
fn test_short_transfer_is_an_error() {
    let mut usb = MockUsb::new();
    usb.expect_control_in()
        .withf(|request, _| *request == ControlRequest::BtConst)
        .times(1)
        .returning(|_, _| Ok(20));

    let mut programmer = FilterProgrammer::new(usb);
    assert_eq!(
        Err(ProgramError::Incomplete {
            expected: 40,
            actual: 20
        }),
        programmer.capability()
    );
}

#[test]
fn test_transport_errors_are_surfaced() {
    let mut usb = MockUsb::new();
    usb.expect_control_in().times(1).returning(|_, _| Err(7));

    let mut programmer = FilterProgrammer::new(usb);
    assert_eq!(Err(ProgramError::Usb(7)), programmer.capability());
}
