#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use embassy_time::{Duration, Instant, Timer, with_timeout};
use rtt_target::{ChannelMode::*, rtt_init};
use tpdrive_engine::STEPS_PER_CYCLE;

mod motor;
use motor::{DRIVE_COMMAND, DriveCommand, DriveConfig, DriveState};

mod telemetry;
use telemetry::RttTelemetry;

#[cfg(feature = "debug")]
use panic_probe as _;
#[cfg(not(feature = "debug"))]
use panic_halt as _;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // defmt logs on up channel 0, one telemetry byte per commutation on up channel 1
    let channels = rtt_init! {
        up: {
            0: { size: 1024, mode: NoBlockSkip, name: "defmt" }
            1: { size: 1024, mode: NoBlockSkip, name: "telemetry" }
        }
    };
    rtt_target::set_defmt_channel(channels.up.0);
    let telemetry = RttTelemetry::new(channels.up.1);

    // Initialize STM32 with HSE=8MHz feeding PLL to 170MHz SYSCLK
    let p = {
        let mut config = embassy_stm32::Config::default();
        {
            use embassy_stm32::rcc::*;
            use embassy_stm32::time::Hertz;
            config.rcc.hse = Some(Hse {
                freq: Hertz(8_000_000),
                mode: HseMode::Oscillator,
            });
            // VCO in: 8MHz / 2 = 4MHz; VCO: 4MHz * 85 = 340MHz; SYSCLK: 340MHz / 2 = 170MHz
            config.rcc.pll = Some(Pll {
                source: PllSource::HSE,
                prediv: PllPreDiv::DIV2,
                mul: PllMul::MUL85,
                divp: None,
                divq: None,
                divr: Some(PllRDiv::DIV2),
            });
            config.rcc.sys = Sysclk::PLL1_R;
            // Above 150MHz, enable Range1 boost mode per RM0440 guidance
            config.rcc.boost = true;
        }
        embassy_stm32::init(config)
    };

    let drive_config = DriveConfig::default();
    // Before anything else: every gate line low, timer idle.
    let driver = motor::init(&drive_config, telemetry);

    defmt::info!("tpdrive starting");

    // Button: PC10, external pull-up, active-low to GND
    let button = ExtiInput::new(p.PC10, p.EXTI10, Pull::None);

    // LED on PC6
    let mut led = Output::new(p.PC6, Level::Low, Speed::Low);

    spawner.spawn(motor::drive_task(driver, drive_config)).unwrap();
    spawner.spawn(button_handler(button)).unwrap();

    defmt::info!("All tasks spawned, entering LED status loop");

    loop {
        let (on, hold) = led_pattern(motor::get_drive_state(), motor::get_drive_position());
        led.set_level(if on { Level::High } else { Level::Low });
        Timer::after(hold).await;
    }
}

/// LED level for `state` and how long to keep it.
///
/// Running follows the rotor: lit for the first half of each electrical cycle, so the blink rate
/// is the electrical frequency. Stopped holds the LED on. De-energized leaves it dark apart from a
/// short blip every two seconds.
fn led_pattern(state: DriveState, position: u16) -> (bool, Duration) {
    match state {
        DriveState::Settling => (Instant::now().as_millis() % 100 < 50, Duration::from_millis(10)),
        DriveState::Running => (position < STEPS_PER_CYCLE / 2, Duration::from_millis(5)),
        DriveState::Stopped => (true, Duration::from_millis(50)),
        DriveState::DeEnergized => {
            let blip = Instant::now().as_millis() % 2000 < 30;
            (blip, Duration::from_millis(10))
        }
    }
}

/// A short press toggles run/stop (and resumes after a de-energize), a long press de-energizes.
#[embassy_executor::task]
async fn button_handler(mut button: ExtiInput<'static>) {
    const DEBOUNCE: Duration = Duration::from_millis(20);
    const LONG_PRESS: Duration = Duration::from_millis(800);

    loop {
        // Active-low, external pull-up.
        button.wait_for_low().await;
        Timer::after(DEBOUNCE).await;
        if button.is_high() {
            continue;
        }

        let long = with_timeout(LONG_PRESS, button.wait_for_high()).await.is_err();
        let command = match (long, motor::get_drive_state()) {
            (_, DriveState::Settling) => None,
            (true, _) => Some(DriveCommand::DeEnergize),
            (false, DriveState::Running) => Some(DriveCommand::Stop),
            (false, _) => Some(DriveCommand::Run),
        };
        if let Some(command) = command {
            defmt::info!("Button: {} press -> {}", if long { "long" } else { "short" }, command);
            DRIVE_COMMAND.signal(command);
        }

        button.wait_for_high().await;
        Timer::after(DEBOUNCE).await;
    }
}
