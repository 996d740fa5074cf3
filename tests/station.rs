// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! End-to-end control scenarios against simulated I/O

use std::sync::Arc;
use std::time::{Duration, Instant};

use liftstation::devices::{DeviceStatus, Priority, Runnable, SystemMode};
use liftstation::io::{AnalogBank, Delivery, DigitalBank, IoModules};
use liftstation::station::assemble_with;
use liftstation::{
    assemble, AppSettings, Config, ConfigStore, MemoryStore, Station, StationCommand, StationError,
};

struct Plant {
    station: Station,
    store: Arc<MemoryStore>,
    di: DigitalBank,
    dout: DigitalBank,
    ai: AnalogBank,
}

/// Three systems, header scaled 0..100 over raw 0..1000, set-point 50 +/- 20
fn plant(runtimes: &[f64]) -> Plant {
    let store = Arc::new(MemoryStore::new());
    for (i, rt) in runtimes.iter().enumerate() {
        store.put(&format!("contactor_{}.total_run_time", i + 1), rt);
    }

    rebuild(store, Delivery::Inline)
}

/// Fresh I/O and station over an existing store, as after a restart
fn rebuild(store: Arc<MemoryStore>, delivery: Delivery) -> Plant {
    let di = DigitalBank::new("di", 0, 10);
    let dout = DigitalBank::new("do", 0, 3);
    let ai = AnalogBank::new("ai", 0, 1, 1000);
    let modules = IoModules {
        digital_inputs: vec![Box::new(di.clone())],
        digital_outputs: vec![Box::new(dout.clone())],
        analog_inputs: vec![Box::new(ai.clone())],
        analog_outputs: vec![],
    };

    let shared: Arc<dyn ConfigStore> = store.clone();
    let station = match delivery {
        Delivery::Inline => assemble_with(&config(), shared, modules, delivery),
        Delivery::Async => assemble(&config(), shared, modules),
    }
    .unwrap();

    Plant {
        station,
        store,
        di,
        dout,
        ai,
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.sensor.ai_max = 1000;
    config
}

fn secs(t0: Instant, s: u64) -> Instant {
    t0 + Duration::from_secs(s)
}

#[test]
fn test_least_run_system_leads() {
    let p = plant(&[100.0, 50.0, 10.0]);
    let t0 = Instant::now();
    p.ai.set(0, 250);

    p.station.tick(t0);
    let ranks: Vec<Priority> = p
        .station
        .systems()
        .iter()
        .map(|s| s.lock().priority_auto(t0))
        .collect();
    assert_eq!(ranks, vec![Priority::Lag2, Priority::Lag1, Priority::Lead]);
    assert!((0..3).all(|i| !p.dout.get(i)));

    // Low header held past the start delay
    p.station.tick(secs(t0, 6));
    assert!(p.dout.get(2));
    assert!(!p.dout.get(0));
    assert!(!p.dout.get(1));
}

#[test]
fn test_header_inside_deadband_is_left_alone() {
    let p = plant(&[0.0, 0.0, 0.0]);
    let t0 = Instant::now();
    p.ai.set(0, 500);

    for s in 0..30 {
        p.station.tick(secs(t0, s));
    }
    assert!((0..3).all(|i| !p.dout.get(i)));
}

#[test]
fn test_high_header_stops_running_system() {
    let p = plant(&[100.0, 50.0, 10.0]);
    let t0 = Instant::now();

    p.ai.set(0, 250);
    p.station.tick(t0);
    p.station.tick(secs(t0, 6));
    assert!(p.dout.get(2));

    // Feedback arrives, then the header overshoots
    p.di.set(2, true);
    p.ai.set(0, 900);
    p.station.tick(secs(t0, 7));
    assert_eq!(p.station.systems()[2].lock().status(), DeviceStatus::Running);

    assert!(p.station.systems()[2].lock().run_time_total(secs(t0, 13)) > 20.0);

    p.station.tick(secs(t0, 13));
    assert!(!p.dout.get(2));

    p.di.set(2, false);
    p.station.tick(secs(t0, 14));
    assert_eq!(p.station.systems()[2].lock().status(), DeviceStatus::Stopped);
    assert!(p.store.get_f64("contactor_3.total_run_time", 0.0) >= 10.0);
}

#[test]
fn test_failed_start_rotates_to_next_system() {
    let p = plant(&[100.0, 50.0, 10.0]);
    let t0 = Instant::now();
    p.ai.set(0, 250);

    p.station.tick(t0);
    p.station.tick(secs(t0, 6));
    assert!(p.dout.get(2));

    // No running feedback past the fail-to-start delay
    p.station.tick(secs(t0, 17));
    {
        let sys3 = p.station.systems()[2].lock();
        assert!(sys3.alarm_fail_to_start(secs(t0, 17)));
        assert_eq!(sys3.priority_auto(secs(t0, 17)), Priority::Out);
    }
    assert_eq!(
        p.station.systems()[1].lock().priority_auto(secs(t0, 17)),
        Priority::Lead
    );

    p.station.tick(secs(t0, 23));
    assert!(p.dout.get(1));
    assert!(!p.dout.get(0));
}

#[test]
fn test_emergency_stop_overrides_demand() {
    let p = plant(&[100.0, 50.0, 10.0]);
    let t0 = Instant::now();
    p.ai.set(0, 250);
    p.di.set(9, true);

    for s in 0..20 {
        p.station.tick(secs(t0, s));
    }
    assert!(p.station.emergency_stop());
    assert!((0..3).all(|i| !p.dout.get(i)));
    assert!(p.station.status(secs(t0, 20)).emergency_stop);

    let result = p.station.apply_at(
        StationCommand::SetSystemMode {
            device_id: 1,
            mode: SystemMode::Hand,
        },
        secs(t0, 20),
    );
    assert!(matches!(result, Err(StationError::EmergencyStop)));
    assert!((0..3).all(|i| !p.dout.get(i)));

    // Release; demand resumes after a fresh start delay
    p.di.set(9, false);
    p.station.tick(secs(t0, 21));
    assert!(!p.station.emergency_stop());
    p.station.tick(secs(t0, 27));
    assert!(p.dout.get(2));
}

#[test]
fn test_hand_mode_runs_regardless_of_demand() {
    let p = plant(&[0.0, 0.0, 0.0]);
    let t0 = Instant::now();
    p.ai.set(0, 900);

    p.station
        .apply_at(
            StationCommand::SetSystemMode {
                device_id: 1,
                mode: SystemMode::Hand,
            },
            t0,
        )
        .unwrap();
    assert!(p.dout.get(0));

    for s in 1..20 {
        p.station.tick(secs(t0, s));
    }
    assert!(p.dout.get(0));

    p.station
        .apply_at(
            StationCommand::SetSystemMode {
                device_id: 1,
                mode: SystemMode::Off,
            },
            secs(t0, 20),
        )
        .unwrap();
    assert!(!p.dout.get(0));
}

#[test]
fn test_json_command_round_trip_through_station() {
    let p = plant(&[0.0, 0.0, 0.0]);
    let cmd = StationCommand::from_json(
        r#"{"command": "set_settings", "settings": {"set_point": 60.0, "offset": 10.0}}"#,
    )
    .unwrap();
    p.station.apply(cmd).unwrap();

    assert_eq!(p.station.settings().set_point, 60.0);
    assert_eq!(p.store.get_f64("application.level_set_point", 0.0), 60.0);
    assert_eq!(p.store.get_f64("application.level_offset", 0.0), 10.0);

    let status = serde_json::to_value(p.station.status(Instant::now())).unwrap();
    assert_eq!(status["settings"]["set_point"], 60.0);
    assert_eq!(status["systems"].as_array().map(|a| a.len()), Some(3));
}

#[test]
fn test_emergency_stop_restarts_start_delay() {
    let p = plant(&[100.0, 50.0, 10.0]);
    let t0 = Instant::now();
    p.ai.set(0, 250);

    p.station.tick(t0);
    p.station.tick(secs(t0, 3));
    p.di.set(9, true);
    p.station.tick(secs(t0, 4));
    assert!(p.station.emergency_stop());

    // Low header throughout; the stop period must not count as demand time
    p.di.set(9, false);
    p.station.tick(secs(t0, 40));
    assert!((0..3).all(|i| !p.dout.get(i)));
    p.station.tick(secs(t0, 43));
    assert!((0..3).all(|i| !p.dout.get(i)));
    p.station.tick(secs(t0, 45));
    assert!(p.dout.get(2));
}

#[test]
fn test_system_count_beyond_wiring_is_rejected() {
    let p = plant(&[0.0, 0.0, 0.0]);
    let settings = AppSettings {
        system_count: 4,
        ..p.station.settings()
    };
    let result = p.station.apply(StationCommand::SetSettings { settings });
    assert!(matches!(result, Err(StationError::InvalidSettings(_))));
    assert_eq!(p.store.get_i64("application.system_count", 0), 3);

    let settings = AppSettings {
        system_count: 2,
        ..p.station.settings()
    };
    p.station.apply(StationCommand::SetSettings { settings }).unwrap();

    // The accepted count takes effect on the next start
    let store = Arc::clone(&p.store);
    drop(p);
    let restarted = rebuild(store, Delivery::Inline);
    assert_eq!(restarted.station.systems().len(), 2);
}

#[test]
fn test_oversized_stored_count_still_starts() {
    let store = Arc::new(MemoryStore::new());
    store.put("application.system_count", &4);

    let p = rebuild(store, Delivery::Inline);
    assert_eq!(p.station.systems().len(), 3);
    assert_eq!(p.store.get_i64("application.system_count", 0), 3);
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

#[tokio::test]
async fn test_async_delivery_reaches_devices() {
    let p = rebuild(Arc::new(MemoryStore::new()), Delivery::Async);

    p.di.set(0, true);
    p.station.tick(Instant::now());
    let running = eventually(|| p.station.systems()[0].lock().status() == DeviceStatus::Running).await;
    assert!(running, "run feedback never reached system_1");

    p.station
        .apply(StationCommand::SetSystemMode {
            device_id: 2,
            mode: SystemMode::Hand,
        })
        .unwrap();
    assert!(p.dout.get(1));

    p.di.set(9, true);
    p.station.tick(Instant::now());
    assert!(eventually(|| p.station.emergency_stop()).await);
    assert!(eventually(|| !p.dout.get(1)).await);
}
