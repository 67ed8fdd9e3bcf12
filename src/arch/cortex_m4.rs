//! # Cortex-M4 port layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! context switching via PendSV, SysTick tick generation, and the
//! load-linked/store-conditional primitives the synchronization layer
//! is built on.
//!
//! ## Context switch mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): used by tasks in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR,
//! PC, and xPSR onto the process stack. The PendSV handler manually
//! saves and restores R4–R11, which completes the full context
//! save/restore.
//!
//! ## Interrupt priorities
//!
//! SysTick and PendSV are both set to the lowest priority (`0xFF`) so
//! neither preempts application-level ISRs, and PendSV only runs once no
//! other interrupt is pending.

use core::arch::asm;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SYST;

use crate::config::STACK_SIZE;
use crate::task::{TaskEntry, Tcb};

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure and enable the SysTick timer for the scheduler tick.
///
/// This is the `tick_enable(freq_hz)` half of the porting-layer
/// contract; it additionally takes the `SYST` peripheral directly
/// rather than stealing it, so ownership stays explicit at the call
/// site in `kernel::start`.
pub fn tick_enable(syst: &mut SYST, freq_hz: u32) {
    let reload = crate::config::SYSTEM_CLOCK_HZ / freq_hz - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Trigger a PendSV exception to perform a context switch.
///
/// Sets the PENDSVSET bit in the Interrupt Control and State Register.
#[inline]
pub fn trigger_pendsv() {
    const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    unsafe {
        core::ptr::write_volatile(ICSR, 1 << 28);
    }
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Set PendSV and SysTick to the lowest interrupt priority so context
/// switches never preempt application-level ISRs.
pub fn set_interrupt_priorities() {
    unsafe {
        // SHPR3: bits [23:16] = PendSV priority, [31:24] = SysTick priority.
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3);
        let val = val | (0xFF << 16) | (0xFF << 24);
        core::ptr::write_volatile(shpr3, val);
    }
}

// ---------------------------------------------------------------------------
// Load-linked / store-conditional primitives
// ---------------------------------------------------------------------------

/// Data memory barrier. Required after a successful exclusive store and
/// before releasing a resource, per the ARM exclusive-access model.
#[inline(always)]
pub fn memory_barrier() {
    cortex_m::asm::dmb();
}

/// Exclusive load of a 32-bit word, opening the local monitor on `addr`.
///
/// # Safety
/// `addr` must be valid for reads and naturally aligned.
#[inline(always)]
pub unsafe fn ll_load(addr: *const u32) -> u32 {
    let value: u32;
    unsafe {
        asm!("ldrex {0}, [{1}]", out(reg) value, in(reg) addr, options(nostack));
    }
    value
}

/// Conditional store of a 32-bit word. Succeeds only if no context
/// switch (or other exclusive access to `addr`) occurred since the
/// matching `ll_load`.
///
/// # Safety
/// `addr` must be valid for writes and naturally aligned, and must be
/// the same address most recently passed to `ll_load` on this core.
#[inline(always)]
pub unsafe fn sc_store(value: u32, addr: *mut u32) -> bool {
    let status: u32;
    unsafe {
        asm!("strex {0}, {1}, [{2}]", out(reg) status, in(reg) value, in(reg) addr, options(nostack));
    }
    status == 0
}

/// Clear this core's local exclusive monitor without performing a
/// store. The hardware already does this implicitly on every exception
/// entry/return; this is called explicitly from the context switch path
/// for documentation and defense in depth.
#[inline(always)]
pub fn clear_exclusive() {
    unsafe {
        asm!("clrex", options(nostack, nomem));
    }
}

/// Halt the CPU in a debugger. No-op contract on release builds that
/// run without a debugger attached is the caller's responsibility
/// (mirrors `debug_assert!`'s own split).
#[inline(always)]
pub fn breakpoint() {
    cortex_m::asm::bkpt();
}

// ---------------------------------------------------------------------------
// Stack initialization
// ---------------------------------------------------------------------------

/// Initialize a task's stack frame for its first context switch.
///
/// The Cortex-M4 hardware automatically pushes an exception frame on
/// interrupt entry. This pre-populates that frame on the task's stack
/// so the first PendSV "return" starts executing `entry(arg)`.
///
/// ## Stack layout (top = high address, growing down)
///
/// ```text
/// [Hardware-stacked frame]   <- initial PSP points here after launch
///   xPSR  (Thumb bit set)
///   PC    (entry)
///   LR    (task_exit trampoline)
///   R12   (0)
///   R3    (0)
///   R2    (0)
///   R1    (0)
///   R0    (arg)
/// [Software-saved context]
///   R11..R4  (0)             <- tcb.sp points here after init
/// ```
pub fn init_task_stack(tcb: &mut Tcb, entry: TaskEntry, arg: usize) {
    let stack_top = tcb.stack.0.as_ptr() as usize + STACK_SIZE;
    let aligned_top = stack_top & !0x07;

    // 16 words: 8 software-saved (R4-R11) + 8 hardware-stacked.
    let frame_ptr = (aligned_top - 16 * 4) as *mut u32;

    unsafe {
        for i in 0..8 {
            *frame_ptr.add(i) = 0; // R4..R11
        }

        *frame_ptr.add(8) = arg as u32; // R0 — task argument
        *frame_ptr.add(9) = 0; // R1
        *frame_ptr.add(10) = 0; // R2
        *frame_ptr.add(11) = 0; // R3
        *frame_ptr.add(12) = 0; // R12
        *frame_ptr.add(13) = task_exit as u32; // LR — return address if the task falls through
        *frame_ptr.add(14) = entry as u32; // PC — entry point
        *frame_ptr.add(15) = 0x0100_0000; // xPSR — Thumb bit set
    }

    tcb.sp = frame_ptr;
}

/// Trampoline the task's LR points at. A task function is typed
/// `fn(usize) -> !`, so reaching here means it returned anyway; treat
/// that as task exit rather than undefined behavior.
extern "C" fn task_exit() -> ! {
    crate::kernel::exit_current_task();
    // exit_current_task() triggers a reschedule and never returns control
    // here, but PendSV is asynchronous — spin until it fires.
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Start the first task by switching to PSP and branching into Thread
/// mode. Called once from `kernel::start`; never returns.
///
/// # Safety
/// Must only be called once, with a valid stack pointer produced by
/// `init_task_stack`.
pub unsafe fn start_first_task(psp: *const u32) -> ! {
    unsafe {
        asm!(
            "adds r0, #32",       // skip the 8 software-saved registers
            "msr psp, r0",
            "movs r0, #2",        // CONTROL.SPSEL = 1 (use PSP in Thread mode)
            "msr control, r0",
            "isb",
            "pop {{r0-r3, r12}}",
            "pop {{r4}}",          // discard LR
            "pop {{r5}}",          // entry point
            "pop {{r6}}",          // discard xPSR
            "cpsie i",
            "bx r5",
            in("r0") psp,
            options(noreturn)
        );
    }
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler — performs the actual context switch.
///
/// # Safety
/// Naked function called directly by the NVIC; must follow the exact
/// Cortex-M4 exception entry/exit convention.
#[no_mangle]
#[naked]
pub unsafe extern "C" fn PendSV() {
    unsafe {
        asm!(
            "mrs r0, psp",
            "stmdb r0!, {{r4-r11}}",
            "bl {save_context}",
            "bl {do_schedule}",
            "ldmia r0!, {{r4-r11}}",
            "msr psp, r0",
            "ldr r0, =0xFFFFFFFD",
            "bx r0",
            save_context = sym save_current_context,
            do_schedule = sym do_context_switch,
            options(noreturn)
        );
    }
}

/// Save the current task's stack pointer. Called from PendSV.
///
/// # Safety
/// Called from assembly context with interrupts disabled.
#[no_mangle]
unsafe extern "C" fn save_current_context(psp: *mut u32) {
    unsafe {
        let scheduler = &mut *crate::kernel::SCHEDULER_PTR;
        let current = scheduler.current;
        scheduler.tasks[current].sp = psp;
    }
}

/// Run the scheduling decision and return the new task's saved stack
/// pointer. Called from PendSV.
///
/// # Safety
/// Called from assembly context.
#[no_mangle]
unsafe extern "C" fn do_context_switch() -> *mut u32 {
    unsafe {
        let scheduler = &mut *crate::kernel::SCHEDULER_PTR;
        let next = scheduler.schedule();
        clear_exclusive();
        scheduler.tasks[next].sp
    }
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler — scheduler tick entry point.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    unsafe {
        let scheduler = &mut *crate::kernel::SCHEDULER_PTR;
        scheduler.tick();

        if scheduler.needs_reschedule {
            trigger_pendsv();
        }
    }
}
