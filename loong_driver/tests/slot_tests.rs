//! Device slot lifecycle tests against shared domain buffers.

use loong_common::bus::Bus;
use loong_common::descriptor::{
    BitLength, CLEAR_ERROR_OBJECT, TEMPERATURE_OBJECT, TransportDescriptor,
};
use loong_common::pdo::DriverRxData;
use loong_common::provider::{ConfigProvider, MotorKey};
use loong_driver::mailbox::{MailboxHandle, MailboxOperation};
use loong_driver::parameters::{DeviceParameters, MotorParameters, ParameterError};
use loong_driver::slot::{DeviceIdentity, MotorSlot, SensorSlot, SlotError, SlotState};
use loong_driver::swap::SwapBuffer;
use std::collections::HashMap;
use std::mem::size_of;
use std::sync::Arc;

/// In-memory calibration table.
#[derive(Default)]
struct TestProvider {
    values: HashMap<(u16, MotorKey), f32>,
}

impl TestProvider {
    fn calibrated(alias: u16) -> Self {
        let mut provider = Self::default();
        for (i, key) in MotorKey::ALL.into_iter().enumerate() {
            provider.values.insert((alias, key), i as f32 + 0.5);
        }
        provider
    }

    fn without(mut self, alias: u16, key: MotorKey) -> Self {
        self.values.remove(&(alias, key));
        self
    }
}

impl ConfigProvider for TestProvider {
    fn motor_parameter(&self, alias: u16, key: MotorKey) -> Option<f32> {
        self.values.get(&(alias, key)).copied()
    }

    fn transport_descriptor(
        &self,
        bus: Bus,
        device_type: &str,
        object: &str,
    ) -> Option<TransportDescriptor> {
        if bus != Bus::Ecat || device_type != "JointDrive" {
            return None;
        }
        match object {
            TEMPERATURE_OBJECT => Some(TransportDescriptor {
                index: 0x2026,
                subindex: 0,
                bit_length: BitLength::Bits16,
                signed: true,
            }),
            CLEAR_ERROR_OBJECT => Some(TransportDescriptor {
                index: 0x2027,
                subindex: 0,
                bit_length: BitLength::Bits8,
                signed: false,
            }),
            _ => None,
        }
    }
}

fn joint(bus: Bus, order: u32, domain: u32, alias: u16) -> DeviceIdentity {
    DeviceIdentity {
        bus,
        order,
        domain,
        slave: 0,
        alias,
        device_type: "JointDrive".into(),
    }
}

fn domain_buffers() -> (Arc<SwapBuffer>, Arc<SwapBuffer>) {
    (Arc::new(SwapBuffer::new(256)), Arc::new(SwapBuffer::new(256)))
}

#[test]
fn second_init_keeps_first_identity() {
    let mut slot = MotorSlot::new();
    slot.init(joint(Bus::Ecat, 0, 0, 1), 0, 0, MailboxHandle(0))
        .expect("first init");

    let err = slot
        .init(joint(Bus::Can, 3, 2, 9), 64, 64, MailboxHandle(5))
        .unwrap_err();
    assert_eq!(err.code(), -1);
    assert!(matches!(err, SlotError::AlreadyInitialized(_)));

    let identity = slot.identity().expect("identity kept");
    assert_eq!(identity, &joint(Bus::Ecat, 0, 0, 1));
    assert_eq!(slot.handle(), MailboxHandle(0));
    assert_eq!(slot.state(), SlotState::Initialized);
}

#[test]
fn configure_with_wrong_order_reports_mismatch() {
    let provider = TestProvider::calibrated(7);
    let mut slot = MotorSlot::new();
    slot.init(joint(Bus::Ecat, 2, 0, 7), 0, 0, MailboxHandle(0))
        .expect("init");

    let (rx, tx) = domain_buffers();
    let err = slot
        .configure(Bus::Ecat, 3, 0, rx, tx, &provider)
        .unwrap_err();

    assert_eq!(err.code(), 1);
    assert!(matches!(
        err,
        SlotError::IdentityMismatch {
            order: 2,
            target_order: 3,
            ..
        }
    ));
    assert_eq!(slot.state(), SlotState::Initialized);
    assert!(!slot.rx().is_attached());
}

#[test]
fn configure_before_init_reports_code_two() {
    let provider = TestProvider::default();
    let mut slot = SensorSlot::new();
    let (rx, tx) = domain_buffers();

    let err = slot.configure(Bus::Ecat, 0, 0, rx, tx, &provider).unwrap_err();
    assert_eq!(err, SlotError::NotInitialized);
    assert_eq!(err.code(), 2);
    assert_eq!(slot.state(), SlotState::Uninitialized);
}

#[test]
fn missing_calibration_value_aborts_configure() {
    let provider = TestProvider::calibrated(4).without(4, MotorKey::MaximumTorque);

    let mut slot = MotorSlot::new();
    slot.init(joint(Bus::Ecat, 0, 0, 4), 0, 0, MailboxHandle(1))
        .expect("init");
    let (rx, tx) = domain_buffers();
    let err = slot
        .configure(Bus::Ecat, 0, 0, rx, tx, &provider)
        .unwrap_err();

    assert_eq!(err.code(), -1);
    assert_eq!(slot.state(), SlotState::Initialized);
    assert!(slot.parameters().is_none());
    assert!(!slot.rx().is_attached());
    assert!(!slot.tx().is_attached());

    let load_err = MotorParameters::load(Bus::Ecat, 4, "JointDrive", MailboxHandle(1), &provider)
        .unwrap_err();
    match load_err {
        ParameterError::Missing { alias, keys } => {
            assert_eq!(alias, 4);
            assert_eq!(keys.as_slice(), &[MotorKey::MaximumTorque]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn configured_motor_writes_into_shared_buffer() {
    let provider = TestProvider::calibrated(3);
    let rx_offset = 2 * size_of::<DriverRxData>();

    let mut slot = MotorSlot::new();
    slot.init(joint(Bus::Ecat, 0, 0, 3), rx_offset, 0, MailboxHandle(2))
        .expect("init");
    let (rx, tx) = domain_buffers();
    slot.configure(Bus::Ecat, 0, 0, Arc::clone(&rx), tx, &provider)
        .expect("configure");
    assert_eq!(slot.state(), SlotState::Configured);

    slot.rx_mut().target_position = 12_345;
    slot.rx_mut().control_word = 0x000F;

    // The write lands in the current block; a commit publishes it and the
    // next staging block starts from the same values.
    rx.commit();
    let mut image = vec![0u8; rx.block_size()];
    rx.read_latest(&mut image).expect("read image");
    let seen: DriverRxData =
        bytemuck::pod_read_unaligned(&image[rx_offset..rx_offset + size_of::<DriverRxData>()]);
    assert_eq!({ seen.target_position }, 12_345);
    assert_eq!({ seen.control_word }, 0x000F);
    assert_eq!({ slot.rx().target_position }, 12_345);
}

#[test]
fn configured_motor_exposes_mailbox_templates() {
    let provider = TestProvider::calibrated(3);
    let mut slot = MotorSlot::new();
    slot.init(joint(Bus::Ecat, 0, 0, 3), 0, 0, MailboxHandle(6))
        .expect("init");
    let (rx, tx) = domain_buffers();
    slot.configure(Bus::Ecat, 0, 0, rx, tx, &provider)
        .expect("configure");

    let params = slot.parameters().expect("parameters loaded");
    assert_eq!(params.polarity, 0.5);
    let mailbox = params.mailbox.expect("ECAT motor has a mailbox");
    assert_eq!(mailbox.temperature.handle, MailboxHandle(6));
    assert_eq!(mailbox.temperature.alias, 3);
    assert_eq!(mailbox.temperature.operation, MailboxOperation::Read);
    assert_eq!(mailbox.clear_error.index, 0x2027);
}

#[test]
fn can_motor_needs_no_descriptor_table() {
    let provider = TestProvider::calibrated(21);
    let mut slot = MotorSlot::new();
    let mut identity = joint(Bus::Can, 0, 2, 21);
    identity.device_type = "WristDrive".into();
    slot.init(identity, 0, 0, MailboxHandle(0)).expect("init");

    let (rx, tx) = domain_buffers();
    slot.configure(Bus::Can, 0, 2, rx, tx, &provider)
        .expect("configure");
    assert!(slot.parameters().expect("loaded").mailbox.is_none());
}
