//! TIM1 as the inverter's PWM timer.
//!
//! Center-aligned mode 1. With `RCR = 0` an advanced timer raises an update event at both the
//! overflow and the underflow, so `RCR = 1` is loaded before the counter starts: one update event
//! per full up/down period, at the underflow, is the cycle boundary. CCR1..3 set each leg's high
//! time.

use embassy_stm32::pac;
use embassy_stm32::pac::timer::vals;
use tpdrive_engine::Channel;
use tpdrive_engine::hal::{DeferredTimer, LockingTimer, PwmTimer};

/// PWM configuration for the motor
#[derive(Clone, Copy)]
pub struct MotorPwmConfig {
    /// Auto-reload value, equal to the table's max duty so compares map 1:1.
    pub top: u16,
    /// Raw DTG field of BDTR. Only used with complementary outputs.
    pub dead_time: u8,
    /// Low sides generated by the timer (update lock variant) or switched by software.
    pub complementary: bool,
}

impl MotorPwmConfig {
    /// 170 MHz / (2 * 255 * 16): ~20.8 kHz.
    pub const DEFERRED: MotorPwmConfig = MotorPwmConfig {
        top: 255,
        dead_time: 0,
        complementary: false,
    };

    /// 170 MHz / (2 * 2047) = ~41.5 kHz with ~500 ns dead time.
    pub const LOCKING: MotorPwmConfig = MotorPwmConfig {
        top: 2047,
        dead_time: 85,
        complementary: true,
    };

    fn prescaler(&self) -> u16 {
        if self.complementary { 0 } else { 15 }
    }
}

pub struct Tim1 {
    config: MotorPwmConfig,
}

impl Tim1 {
    pub const fn new(config: MotorPwmConfig) -> Self {
        Self { config }
    }

    /// Reads the compare-match sources that are both pending and enabled.
    #[inline(always)]
    pub fn pending_compares() -> impl Iterator<Item = Channel> {
        let sr = pac::TIM1.sr().read();
        let dier = pac::TIM1.dier().read();
        Channel::ALL
            .into_iter()
            .filter(move |c| sr.ccif(c.index()) && dier.ccie(c.index()))
    }
}

/// SR flags are rc_w0: write ones everywhere except the flags being cleared, so a flag raised
/// between a read and the write-back is never lost.
#[inline(always)]
fn clear_flags(f: impl FnOnce(&mut pac::timer::regs::SrAdv)) {
    pac::TIM1.sr().write(|w| {
        w.0 = !0;
        f(w);
    });
}

impl PwmTimer for Tim1 {
    fn configure_idle(&mut self) {
        let tim = pac::TIM1;
        let config = self.config;

        pac::RCC.apb2enr().modify(|w| w.set_tim1en(true));

        tim.cr1().modify(|w| w.set_cen(false));
        tim.dier().write(|_| {});
        tim.sr().write(|w| w.0 = 0);

        tim.psc().write_value(config.prescaler());
        tim.arr().write(|w| w.set_arr(config.top.into()));
        // One update per full period. Loaded into the repetition counter by the UG below.
        tim.rcr().write(|w| w.set_rep(1));

        for channel in Channel::ALL {
            let index = channel.index();
            tim.ccmr_output(index / 2).modify(|w| {
                w.set_ocm(index % 2, vals::Ocm::PWM_MODE1);
                // Preload only under the update lock: deferred apply writes at the boundary.
                w.set_ocpe(index % 2, config.complementary);
            });
            tim.ccr(index).write(|w| w.set_ccr(0));
            tim.ccer().modify(|w| {
                w.set_cce(index, true);
                w.set_ccne(index, config.complementary);
            });
        }

        tim.bdtr().modify(|w| {
            w.set_dtg(config.dead_time);
            // The deferred variant only drives the high sides from the timer, so the
            // outputs can be live from the start; every compare is zero.
            w.set_moe(!config.complementary);
        });

        tim.cr1().modify(|w| {
            w.set_cms(vals::Cms::CENTER_ALIGNED1);
            w.set_urs(vals::Urs::COUNTER_ONLY);
            w.set_arpe(true);
            w.set_udis(false);
        });
        tim.egr().write(|w| w.set_ug(true));
        tim.sr().write(|w| w.0 = 0);
        tim.cr1().modify(|w| w.set_cen(true));
    }

    #[inline(always)]
    fn set_compare(&mut self, channel: Channel, value: u16) {
        pac::TIM1
            .ccr(channel.index())
            .write(|w| w.set_ccr(value.into()));
    }
}

impl DeferredTimer for Tim1 {
    fn enable_commit_interrupt(&mut self) {
        pac::TIM1.dier().modify(|w| w.set_uie(true));
    }

    #[inline(always)]
    fn arm_boundary(&mut self, channel: Option<Channel>) {
        let tim = pac::TIM1;
        if let Some(channel) = channel {
            clear_flags(|w| w.set_ccif(channel.index(), false));
        }
        tim.dier().write(|w| {
            if let Some(channel) = channel {
                w.set_ccie(channel.index(), true);
            }
        });
    }

    #[inline(always)]
    fn disarm_boundary(&mut self, channel: Channel) {
        pac::TIM1
            .dier()
            .modify(|w| w.set_ccie(channel.index(), false));
    }

    #[inline(always)]
    fn acknowledge_overflow(&mut self) {
        clear_flags(|w| w.set_uif(false));
    }

    #[inline(always)]
    fn acknowledge_compare(&mut self, channel: Channel) {
        clear_flags(|w| w.set_ccif(channel.index(), false));
    }
}

impl LockingTimer for Tim1 {
    fn acquire_update_lock(&mut self) {
        pac::TIM1.cr1().modify(|w| w.set_udis(true));
    }

    fn release_update_lock(&mut self) {
        pac::TIM1.cr1().modify(|w| w.set_udis(false));
    }

    fn enable_outputs(&mut self) {
        pac::TIM1.bdtr().modify(|w| w.set_moe(true));
    }

    fn disable_outputs(&mut self) {
        pac::TIM1.bdtr().modify(|w| w.set_moe(false));
    }
}
