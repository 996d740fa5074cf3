// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Builds and wires a station from configuration

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::{DemandStarter, RuntimeAlternator, Station, StationParts};
use crate::config::{AppSettings, Config};
use crate::core::EventDispatcher;
use crate::devices::{Contactor, Pump, Sensor, SensorHandle, System, SystemHandle};
use crate::error::StationResult;
use crate::io::{AnalogInputChanged, Delivery, DigitalInputChanged, IoCache, IoModules};
use crate::store::ConfigStore;

pub const PRIMARY_SENSOR_ID: u32 = 1;
pub const SECONDARY_SENSOR_ID: u32 = 2;

/// Build a station with asynchronous event delivery
pub fn assemble(config: &Config, store: Arc<dyn ConfigStore>, modules: IoModules) -> StationResult<Station> {
    assemble_with(config, store, modules, Delivery::Async)
}

/// Build a station, choosing how I/O change events are delivered
pub fn assemble_with(
    config: &Config,
    store: Arc<dyn ConfigStore>,
    modules: IoModules,
    delivery: Delivery,
) -> StationResult<Station> {
    config.validate()?;
    let wired = config.io.systems.len();

    let mut settings = AppSettings::from_store(store.as_ref(), &config.settings);
    if settings.system_count > wired {
        warn!(
            "Stored system count {} exceeds the {} wired systems, using {}",
            settings.system_count, wired, wired
        );
        settings.system_count = wired;
        settings.persist(store.as_ref());
    }

    let dispatcher = Arc::new(EventDispatcher::new());
    let io = Arc::new(IoCache::new(Arc::clone(&dispatcher), modules).with_delivery(delivery));
    check_wiring(config, &io, settings.system_count);

    let now = Instant::now();
    let systems: Vec<SystemHandle> = config
        .io
        .systems
        .iter()
        .take(settings.system_count)
        .enumerate()
        .map(|(i, wiring)| {
            let id = i as u32 + 1;
            let mut contactor = Contactor::new(
                id,
                Arc::clone(&io),
                Arc::clone(&store),
                wiring.di_running,
                wiring.do_run,
            );
            contactor.set_fail_to_start_delay(settings.fail_to_start_delay);

            let mut system = System::new(id, contactor, Some(Pump::new(id)), wiring.di_hand, wiring.di_auto);
            system.set_mode(config.initial_mode, now);
            let handle = system.into_handle();
            subscribe_system(&dispatcher, &handle);
            handle
        })
        .collect();

    let primary = Sensor::new(
        PRIMARY_SENSOR_ID,
        config.io.ai_primary_sensor,
        Arc::clone(&store),
        &config.sensor,
    )
    .into_handle();
    subscribe_sensor(&dispatcher, &primary);

    let secondary = config.io.ai_secondary_sensor.map(|channel| {
        let handle =
            Sensor::new(SECONDARY_SENSOR_ID, channel, Arc::clone(&store), &config.sensor).into_handle();
        subscribe_sensor(&dispatcher, &handle);
        handle
    });

    info!(
        "Assembled station: {} systems, sensor on AI{}, e-stop on DI{}",
        systems.len(),
        config.io.ai_primary_sensor,
        config.io.di_emergency_stop
    );

    Ok(Station::new(StationParts {
        dispatcher,
        io,
        store,
        systems,
        primary,
        secondary,
        settings,
        wired_systems: wired,
        di_emergency_stop: config.io.di_emergency_stop,
        alternator: Box::new(RuntimeAlternator::new()),
        starter: Box::new(DemandStarter::new()),
    }))
}

fn subscribe_system(dispatcher: &EventDispatcher, handle: &SystemHandle) {
    let weak = Arc::downgrade(handle);
    dispatcher.subscribe(move |event: &DigitalInputChanged| {
        if let Some(system) = weak.upgrade() {
            system.lock().handle_di(event, Instant::now());
        }
        Ok(())
    });
}

fn subscribe_sensor(dispatcher: &EventDispatcher, handle: &SensorHandle) {
    let weak = Arc::downgrade(handle);
    dispatcher.subscribe(move |event: &AnalogInputChanged| {
        if let Some(sensor) = weak.upgrade() {
            sensor.lock().handle_ai(event, Instant::now());
        }
        Ok(())
    });
}

/// Channels outside the installed modules read as neutral forever; say so up front
fn check_wiring(config: &Config, io: &IoCache, system_count: usize) {
    let di = io.digital_input_count();
    let dout = io.digital_output_count();
    let ai = io.analog_input_count();

    let mut inputs = vec![config.io.di_emergency_stop];
    for wiring in config.io.systems.iter().take(system_count) {
        inputs.extend([wiring.di_running, wiring.di_hand, wiring.di_auto]);
        if wiring.do_run >= dout {
            warn!("Run command DO{} is not provided by any module", wiring.do_run);
        }
    }
    for channel in inputs.into_iter().filter(|&c| c >= di) {
        warn!("DI{} is not provided by any module", channel);
    }

    let sensors = std::iter::once(config.io.ai_primary_sensor).chain(config.io.ai_secondary_sensor);
    for channel in sensors.filter(|&c| c >= ai) {
        warn!("Sensor AI{} is not provided by any module", channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemWiring;
    use crate::devices::SystemMode;
    use crate::error::StationError;
    use crate::io::{AnalogBank, DigitalBank};
    use crate::store::MemoryStore;

    fn modules() -> IoModules {
        IoModules {
            digital_inputs: vec![Box::new(DigitalBank::new("di", 0, 10))],
            digital_outputs: vec![Box::new(DigitalBank::new("do", 0, 4))],
            analog_inputs: vec![Box::new(AnalogBank::new("ai", 0, 2, 24_729))],
            analog_outputs: vec![],
        }
    }

    #[test]
    fn test_builds_configured_systems() {
        let station = assemble(&Config::default(), Arc::new(MemoryStore::new()), modules()).unwrap();
        assert_eq!(station.systems().len(), 3);
        assert!(station.secondary_sensor().is_none());
        assert_eq!(station.system(2).map(|s| s.lock().mode()), Some(SystemMode::Auto));
    }

    #[test]
    fn test_stored_settings_win_over_file() {
        let store = Arc::new(MemoryStore::new());
        store.put("application.system_count", &2);
        let station = assemble(&Config::default(), store, modules()).unwrap();
        assert_eq!(station.systems().len(), 2);
        assert_eq!(station.settings().system_count, 2);
    }

    #[test]
    fn test_stored_count_is_clamped_to_wiring() {
        let store = Arc::new(MemoryStore::new());
        store.put("application.system_count", &4);
        let station = assemble(&Config::default(), store.clone(), modules()).unwrap();
        assert_eq!(station.systems().len(), 3);
        assert_eq!(station.settings().system_count, 3);
        assert_eq!(store.get_i64("application.system_count", 0), 3);
    }

    #[test]
    fn test_more_systems_than_wiring_fails() {
        let mut config = Config::default();
        config.settings.system_count = 4;
        let result = assemble(&config, Arc::new(MemoryStore::new()), modules());
        assert!(matches!(result, Err(StationError::InvalidSettings(_))));
    }

    #[test]
    fn test_secondary_sensor_is_optional() {
        let mut config = Config::default();
        config.io.ai_secondary_sensor = Some(1);
        config.io.systems.push(SystemWiring {
            di_running: 3,
            do_run: 3,
            di_hand: 0,
            di_auto: 0,
        });
        let station = assemble(&config, Arc::new(MemoryStore::new()), modules()).unwrap();
        assert!(station.secondary_sensor().is_some());
        assert_eq!(station.systems().len(), 3);
    }
}
