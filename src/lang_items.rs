//! Language items and default exception handlers

// With the defmt feature on ARM targets, logging goes over RTT and panics
// through panic-probe.
#[cfg(all(feature = "defmt", target_arch = "arm"))]
use defmt_rtt as _;

#[cfg(all(feature = "defmt", target_arch = "arm"))]
use panic_probe as _;

#[cfg(all(feature = "defmt", target_arch = "arm"))]
#[defmt::panic_handler]
fn defmt_panic() -> ! {
    cortex_m::asm::udf()
}

// Without defmt the panic handler just halts the CPU.
#[cfg(all(not(feature = "defmt"), target_arch = "arm"))]
#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {
        cortex_m::asm::udf();
    }
}

// Bus and usage faults end up here with the captured register frame; break
// so a debugger can inspect it.
#[cfg(target_arch = "arm")]
#[cortex_m_rt::exception]
unsafe fn HardFault(frame: &cortex_m_rt::ExceptionFrame) -> ! {
    crate::error!(
        "hard fault: pc={=u32:08x} lr={=u32:08x}",
        frame.pc(),
        frame.lr()
    );
    let _ = frame;
    loop {
        cortex_m::asm::bkpt();
    }
}

// Log timestamps are kernel ticks.
#[cfg(all(feature = "defmt", target_arch = "arm"))]
defmt::timestamp!("{=u32}", crate::kernel::os_elapsed_ticks());
