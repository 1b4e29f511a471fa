mod common;

use common::BenchHandle;
use rpm_core::{
    ArmingCheckError, InstanceConfig, InstanceId, MAX_INSTANCES, PinId, RpmConfig, RpmError,
    RpmManager, RpmType, SlotDetection, SlotStatus, params,
};

fn slot(kind: RpmType) -> InstanceConfig {
    let pin = kind.requires_pin().then(|| PinId::new(50));
    InstanceConfig::new(kind, pin, 1.0)
}

#[test]
fn detection_counts_configured_slots_and_leaves_gaps_disabled() {
    let bench = BenchHandle::new();
    let config = RpmConfig::new()
        .with_instance(0, slot(RpmType::Pwm))
        .with_instance(2, slot(RpmType::Efi));
    let mut manager = RpmManager::new(config, bench.hardware());

    let report = manager.init();

    assert_eq!(report.active.get(), 2);
    assert_eq!(manager.num_sensors(), 2);
    assert_eq!(
        report.slots,
        [
            SlotDetection::Detected {
                kind: RpmType::Pwm,
                has_source: true,
            },
            SlotDetection::Disabled,
            SlotDetection::Detected {
                kind: RpmType::Efi,
                has_source: true,
            },
            SlotDetection::Disabled,
        ]
    );
    assert!(manager.enabled(0));
    assert!(!manager.enabled(1));
    assert!(manager.enabled(2));
    assert!(!manager.enabled(3));
    assert_eq!(bench.pin(0), Some(PinId::new(50)));
}

#[test]
fn every_slot_can_be_active_but_never_more() {
    let bench = BenchHandle::new();
    let mut config = RpmConfig::new();
    for index in 0..MAX_INSTANCES {
        config = config.with_instance(index, slot(RpmType::Sim));
    }
    let mut manager = RpmManager::new(config, bench.hardware());

    manager.init();
    assert_eq!(manager.num_sensors(), 4);
    manager.init();
    assert_eq!(manager.num_sensors(), 4);
    assert!(!manager.enabled(4));
    assert!(!manager.enabled(u8::MAX));
}

#[test]
fn slots_past_the_active_count_are_never_usable() {
    let bench = BenchHandle::new();
    let config = RpmConfig::new()
        .with_instance(0, slot(RpmType::Sim))
        .with_instance(1, slot(RpmType::Sim));
    let mut manager = RpmManager::new(config, bench.hardware());
    manager.init();

    bench.feed(0, 1_200.0, 0.0);
    bench.feed(1, 1_300.0, 0.0);
    manager.update(10);

    let count = manager.num_sensors();
    assert_eq!(count, 2);
    for index in count..8 {
        assert!(!manager.healthy(index, 10), "slot {index} reported healthy");
        assert!(manager.get_rpm(index, 10).is_err(), "slot {index} returned a rate");
    }
    assert!(manager.healthy(0, 10));
    assert!(manager.healthy(1, 10));
}

#[test]
fn unsupported_type_code_disables_only_that_slot() {
    let bench = BenchHandle::new();
    let config = RpmConfig::new()
        .with_instance(0, slot(RpmType::Sim))
        .with_instance(1, InstanceConfig::from_raw_type(7, None, 1.0));
    let mut manager = RpmManager::new(config, bench.hardware());

    let report = manager.init();

    assert_eq!(report.slots[1], SlotDetection::Unsupported { code: 7 });
    assert_eq!(manager.num_sensors(), 1);
    assert!(manager.enabled(0));
    assert!(!manager.enabled(1));
    assert_eq!(manager.get_rpm(1, 0), Err(RpmError::Disabled));
    assert_eq!(bench.created(1), 0);
}

#[test]
fn missing_source_keeps_slot_enabled_but_never_healthy() {
    let bench = BenchHandle::new();
    bench.make_unavailable(0);
    let config = RpmConfig::new().with_instance(0, slot(RpmType::Pin));
    let mut manager = RpmManager::new(config, bench.hardware());

    let report = manager.init();
    assert_eq!(
        report.slots[0],
        SlotDetection::Detected {
            kind: RpmType::Pin,
            has_source: false,
        }
    );
    assert!(manager.enabled(0));

    bench.feed(0, 3_000.0, 1.0);
    for now in [0, 10, 20, 500] {
        manager.update(now);
        assert!(!manager.healthy(0, now));
    }
    assert_eq!(manager.status(InstanceId::ALL[0], 500), SlotStatus::ActiveUnread);
}

#[test]
fn redetection_applies_type_changes_and_releases_old_backends() {
    let bench = BenchHandle::new();
    let config = RpmConfig::new().with_instance(0, slot(RpmType::Sim));
    let mut manager = RpmManager::new(config, bench.hardware());
    manager.init();
    assert!(manager.enabled(0));

    bench.feed(0, 2_500.0, 0.0);
    manager.update(5);
    assert!(manager.healthy(0, 5));

    let change = params::set(manager.config_mut(), "RPM1_TYPE", "0").expect("valid value");
    assert!(change.requires_detection());
    assert!(!manager.enabled(0));
    assert!(!manager.healthy(0, 5));
    assert_eq!(manager.get_rpm(0, 5), Err(RpmError::Disabled));
    assert_eq!(manager.get_signal_quality(0), Err(RpmError::Disabled));
    assert_eq!(bench.released(0), 0);

    manager.init();
    assert!(!manager.enabled(0));
    assert_eq!(manager.num_sensors(), 0);
    assert_eq!(bench.released(0), 1);
    assert_eq!(manager.state(InstanceId::ALL[0]).last_reading_ms(), None);

    params::set(manager.config_mut(), "RPM1_TYPE", "10").expect("valid value");
    manager.init();
    assert!(manager.enabled(0));
    assert_eq!(manager.kind(InstanceId::ALL[0]), Some(RpmType::Sim));
    assert_eq!(bench.created(0), 2);
}

#[test]
fn shutdown_releases_every_backend() {
    let bench = BenchHandle::new();
    let config = RpmConfig::new()
        .with_instance(1, slot(RpmType::Efi))
        .with_instance(3, slot(RpmType::HarmonicNotch));
    let mut manager = RpmManager::new(config, bench.hardware());
    manager.init();

    manager.shutdown();

    assert_eq!(manager.num_sensors(), 0);
    assert_eq!(bench.released(0), 0);
    assert_eq!(bench.released(1), 1);
    assert_eq!(bench.released(3), 1);
    assert!((0..4).all(|index| !manager.enabled(index)));
}

#[test]
fn arming_checks_flag_missing_pins_and_inverted_bounds() {
    let bench = BenchHandle::new();
    let config = RpmConfig::new()
        .with_instance(0, slot(RpmType::Efi))
        .with_instance(1, InstanceConfig::new(RpmType::Pwm, None, 1.0));
    let mut manager = RpmManager::new(config, bench.hardware());

    assert_eq!(
        manager.arming_checks(),
        Err(ArmingCheckError::MissingPin {
            instance: InstanceId::ALL[1],
        })
    );

    manager.config_mut().instances[1].pin = Some(PinId::new(3));
    assert_eq!(manager.arming_checks(), Ok(()));

    let inverted = manager.config().with_bounds(900.0, 100.0);
    *manager.config_mut() = inverted;
    assert_eq!(
        manager.arming_checks(),
        Err(ArmingCheckError::InvertedBounds {
            minimum: 900.0,
            maximum: 100.0,
        })
    );
}
