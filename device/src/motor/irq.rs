//! TIM1 vectors for deferred apply.
//!
//! Both run above every embassy priority: the overflow handler must finish its compare writes
//! before the counter reaches the smallest non-zero duty.

use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};

use super::DEFERRED;
use super::pwm::Tim1;

pub fn enable() {
    interrupt::TIM1_UP_TIM16.set_priority(Priority::P0);
    interrupt::TIM1_CC.set_priority(Priority::P0);
    // Safety: both handlers only touch DEFERRED, which was initialized before this call.
    unsafe {
        interrupt::TIM1_UP_TIM16.enable();
        interrupt::TIM1_CC.enable();
    }
}

#[interrupt]
fn TIM1_UP_TIM16() {
    DEFERRED.on_overflow();
}

#[interrupt]
fn TIM1_CC() {
    for channel in Tim1::pending_compares() {
        DEFERRED.on_compare(channel);
    }
}
