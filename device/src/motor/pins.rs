//! Gate-drive lines of the B-G431B-ESC1 inverter.
//!
//! | Leg | High          | Low            |
//! |-----|---------------|----------------|
//! | A   | PA8 TIM1_CH1  | PC13 TIM1_CH1N |
//! | B   | PA9 TIM1_CH2  | PA12 TIM1_CH2N |
//! | C   | PA10 TIM1_CH3 | PB15 TIM1_CH3N |
//!
//! Lines are driven through BSRR so a single store switches them, which keeps the compare
//! handlers down to two writes.

use embassy_stm32::pac;
use embassy_stm32::pac::gpio::{Gpio, vals};
use tpdrive_engine::hal::{BridgePins, DrivePin, HalfBridge};

#[derive(Clone, Copy)]
pub struct GateLine {
    port: Gpio,
    pin: usize,
    /// Alternate function routing this pin to its TIM1 output.
    af: u8,
}

impl GateLine {
    const fn new(port: Gpio, pin: usize, af: u8) -> Self {
        Self { port, pin, af }
    }

    /// Hands the pin over to TIM1.
    pub fn route_to_timer(&self) {
        self.port
            .ospeedr()
            .modify(|w| w.set_ospeedr(self.pin, vals::Ospeedr::VERY_HIGH_SPEED));
        self.port
            .afr(self.pin / 8)
            .modify(|w| w.set_afr(self.pin % 8, self.af));
        self.port
            .moder()
            .modify(|w| w.set_moder(self.pin, vals::Moder::ALTERNATE));
    }
}

impl DrivePin for GateLine {
    #[inline(always)]
    fn on(&mut self) {
        self.port.bsrr().write(|w| w.set_bs(self.pin, true));
    }

    #[inline(always)]
    fn off(&mut self) {
        self.port.bsrr().write(|w| w.set_br(self.pin, true));
    }

    fn configure_as_output(&mut self) {
        self.port
            .otyper()
            .modify(|w| w.set_ot(self.pin, vals::Ot::PUSH_PULL));
        self.port
            .moder()
            .modify(|w| w.set_moder(self.pin, vals::Moder::OUTPUT));
    }
}

pub const A_HIGH: GateLine = GateLine::new(pac::GPIOA, 8, 6);
pub const A_LOW: GateLine = GateLine::new(pac::GPIOC, 13, 4);
pub const B_HIGH: GateLine = GateLine::new(pac::GPIOA, 9, 6);
pub const B_LOW: GateLine = GateLine::new(pac::GPIOA, 12, 6);
pub const C_HIGH: GateLine = GateLine::new(pac::GPIOA, 10, 6);
pub const C_LOW: GateLine = GateLine::new(pac::GPIOB, 15, 4);

pub const fn bridge() -> BridgePins<GateLine> {
    BridgePins::new(
        HalfBridge {
            high: A_HIGH,
            low: A_LOW,
        },
        HalfBridge {
            high: B_HIGH,
            low: B_LOW,
        },
        HalfBridge {
            high: C_HIGH,
            low: C_LOW,
        },
    )
}

/// Routes the timer-driven lines to TIM1 once the engine has forced the bridge safe.
///
/// With the update lock all six are timer outputs. With deferred apply the low sides stay
/// GPIO outputs owned by the compare handlers.
pub fn route_timer_outputs(complementary: bool) {
    for line in [A_HIGH, B_HIGH, C_HIGH] {
        line.route_to_timer();
    }
    if complementary {
        for line in [A_LOW, B_LOW, C_LOW] {
            line.route_to_timer();
        }
    }
}
