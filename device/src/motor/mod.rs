//! Open-loop sinusoidal drive for the B-G431B-ESC1 inverter.
//!
//! Motor: ZD2808-V1.9 700KV, 12N14P outrunner on a 3S-4S supply.

#[cfg(feature = "deferred-apply")]
pub mod irq;
pub mod pins;
pub mod pwm;

use core::sync::atomic::{AtomicU8, AtomicU16, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker, Timer};
#[cfg(feature = "deferred-apply")]
use tpdrive_engine::apply::DeferredApply;
#[cfg(not(feature = "deferred-apply"))]
use tpdrive_engine::apply::LockApply;
use tpdrive_engine::{Phase, ThreePhaseDriver};

use self::pins::GateLine;
use self::pwm::{MotorPwmConfig, Tim1};
use crate::telemetry::RttTelemetry;

/// Drive parameters
#[derive(Clone, Copy)]
pub struct DriveConfig {
    /// Amplitude applied once the bridge has settled, and on every restart.
    pub amplitude: u8,
    /// Period between two `advance()` calls.
    pub cadence: Duration,
    /// Delay between forcing the bridge safe and the first commit.
    pub settle: Duration,
    pub pwm: MotorPwmConfig,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            amplitude: 20,
            cadence: Duration::from_micros(100),
            settle: Duration::from_millis(100),
            #[cfg(feature = "deferred-apply")]
            pwm: MotorPwmConfig::DEFERRED,
            #[cfg(not(feature = "deferred-apply"))]
            pwm: MotorPwmConfig::LOCKING,
        }
    }
}

/// Shared with the TIM1 vectors in [`irq`].
#[cfg(feature = "deferred-apply")]
pub static DEFERRED: DeferredApply<Tim1, GateLine> =
    DeferredApply::new(Tim1::new(MotorPwmConfig::DEFERRED), pins::bridge());

#[cfg(feature = "deferred-apply")]
pub type Strategy = &'static DeferredApply<Tim1, GateLine>;
#[cfg(not(feature = "deferred-apply"))]
pub type Strategy = LockApply<Tim1, GateLine>;

pub type Drive = ThreePhaseDriver<Strategy, RttTelemetry>;

/// Builds the driver and forces the bridge into its safe state.
///
/// Gate lines are only handed to TIM1 after every one of them has been driven low.
pub fn init(config: &DriveConfig, telemetry: RttTelemetry) -> Drive {
    #[cfg(feature = "deferred-apply")]
    let strategy: Strategy = &DEFERRED;
    #[cfg(not(feature = "deferred-apply"))]
    let strategy: Strategy = LockApply::new(Tim1::new(config.pwm), pins::bridge());

    let mut driver = ThreePhaseDriver::new(strategy, telemetry);
    driver.init();
    pins::route_timer_outputs(config.pwm.complementary);

    #[cfg(feature = "deferred-apply")]
    irq::enable();

    set_drive_state(DriveState::Settling);
    defmt::info!(
        "Drive idle: top={} dead_time={} complementary={}",
        config.pwm.top,
        config.pwm.dead_time,
        config.pwm.complementary
    );
    driver
}

#[derive(Clone, Copy, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum DriveState {
    Settling = 0,
    Running = 1,
    Stopped = 2,
    DeEnergized = 3,
}

#[derive(Clone, Copy, defmt::Format)]
pub enum DriveCommand {
    /// Resume at the configured amplitude.
    Run,
    /// Keep commutating at zero amplitude.
    Stop,
    /// Zero the outputs and stop commutating.
    DeEnergize,
}

/// Commands for [`drive_task`]; only the latest one is kept.
pub static DRIVE_COMMAND: Signal<CriticalSectionRawMutex, DriveCommand> = Signal::new();

static DRIVE_STATE: AtomicU8 = AtomicU8::new(DriveState::Settling as u8);
static DRIVE_POSITION: AtomicU16 = AtomicU16::new(0);

fn set_drive_state(state: DriveState) {
    DRIVE_STATE.store(state as u8, Ordering::Relaxed);
}

pub fn get_drive_state() -> DriveState {
    match DRIVE_STATE.load(Ordering::Relaxed) {
        0 => DriveState::Settling,
        1 => DriveState::Running,
        2 => DriveState::Stopped,
        _ => DriveState::DeEnergized,
    }
}

/// Position in the electrical cycle the next commit lands on.
pub fn get_drive_position() -> u16 {
    DRIVE_POSITION.load(Ordering::Relaxed)
}

fn handle_command(driver: &mut Drive, command: DriveCommand, config: &DriveConfig) {
    defmt::info!("Drive command: {}", command);
    match command {
        DriveCommand::Run => {
            driver.set_amplitude(config.amplitude);
            set_drive_state(DriveState::Running);
        }
        DriveCommand::Stop => {
            driver.set_amplitude(0);
            set_drive_state(DriveState::Stopped);
        }
        DriveCommand::DeEnergize => {
            driver.set_amplitude(0);
            // Not a sector: the driver de-energizes and keeps its phase.
            let _ = driver.advance_to(Phase::Uninitialized, 0);
            set_drive_state(DriveState::DeEnergized);
        }
    }
}

/// Foreground commutation: one `advance()` per cadence tick.
#[embassy_executor::task]
pub async fn drive_task(mut driver: Drive, config: DriveConfig) {
    Timer::after(config.settle).await;
    driver.set_amplitude(config.amplitude);
    set_drive_state(DriveState::Running);
    defmt::info!("Drive running: amplitude={}", config.amplitude);

    let mut ticker = Ticker::every(config.cadence);
    loop {
        if get_drive_state() == DriveState::DeEnergized {
            let command = DRIVE_COMMAND.wait().await;
            handle_command(&mut driver, command, &config);
            ticker.reset();
            continue;
        }

        if let Some(command) = DRIVE_COMMAND.try_take() {
            handle_command(&mut driver, command, &config);
            if get_drive_state() == DriveState::DeEnergized {
                continue;
            }
        }

        if let Err(e) = driver.advance() {
            defmt::warn!("Commutation at {} failed: {}", driver.position(), e);
        }
        DRIVE_POSITION.store(driver.position(), Ordering::Relaxed);

        ticker.next().await;
    }
}
