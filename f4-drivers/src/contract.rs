//! Contract checks with a build-time failure policy.
//!
//! Two classes of check are used across the crate:
//!
//! - [`expect()`] guards a precondition the system can survive (uninitialized
//!   peripheral, zero-length buffer, full queue). The failure is reported
//!   according to [`POLICY`] and then handed back to the caller as `Err`.
//! - [`fatal()`] marks a state that cannot be recovered from. It never returns.
//!
//! ## Policy selection
//!
//! | Feature | Policy | `expect()` failure | `fatal()` |
//! |---------|--------|--------------------|-----------|
//! | (none) | [`Policy::Log`] | `log::warn!`, return `Err` | panic |
//! | `contract-ignore` | [`Policy::Ignore`] | return `Err` | panic |
//! | `contract-trap` | [`Policy::Trap`] | panic | panic |
//! | `contract-reset` | [`Policy::Reset`] | system reset | system reset |
//!
//! When several policy features are enabled the most severe one wins.

use core::panic::Location;

/// What happens when a contract check fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Return the error, report nothing.
    Ignore,
    /// Log a warning with the call site, return the error.
    Log,
    /// Panic at the call site.
    Trap,
    /// Reset the microcontroller.
    Reset,
}

/// Policy compiled into this build.
pub const POLICY: Policy = if cfg!(feature = "contract-reset") {
    Policy::Reset
} else if cfg!(feature = "contract-trap") {
    Policy::Trap
} else if cfg!(feature = "contract-ignore") {
    Policy::Ignore
} else {
    Policy::Log
};

/// EXPECT-class check: `Ok(())` if `cond` holds, otherwise report and `Err(err)`.
#[track_caller]
pub fn expect<E>(cond: bool, err: E, what: &'static str) -> Result<(), E> {
    if cond {
        return Ok(());
    }
    violated(what);
    Err(err)
}

/// Report an EXPECT-class failure that was detected without a boolean test.
#[track_caller]
pub fn violated(what: &'static str) {
    match POLICY {
        Policy::Ignore => {}
        Policy::Log => {
            let site = Location::caller();
            log::warn!("expectation failed: {} ({}:{})", what, site.file(), site.line());
        }
        Policy::Trap => panic!("expectation failed: {}", what),
        Policy::Reset => reset(),
    }
}

/// ASSERT-class failure. Does not return.
#[track_caller]
pub fn fatal(what: &'static str) -> ! {
    if POLICY == Policy::Reset {
        reset();
    }
    panic!("assertion failed: {}", what)
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
fn reset() -> ! {
    cortex_m::peripheral::SCB::sys_reset()
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
fn reset() -> ! {
    panic!("system reset requested")
}
