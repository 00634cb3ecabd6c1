//! `SIGSEGV` handling on Linux/x86-64: reads the fixed registers [`super::super::handler`]
//! needs straight out of the `ucontext_t` the kernel hands the signal trampoline.

use std::mem::MaybeUninit;
use std::sync::Once;

use libc::{c_int, c_void, sigaction, siginfo_t, ucontext_t, SA_SIGINFO, SIGSEGV};

use super::super::handler::{self, FaultAction, FaultRegs};

static INSTALL: Once = Once::new();
static mut PREV: MaybeUninit<sigaction> = MaybeUninit::uninit();

/// Installs the process-wide `SIGSEGV` handler exactly once. Safe to call on every
/// `fault::handler::install`; later calls are no-ops.
pub fn install() {
    INSTALL.call_once(|| unsafe {
        let mut act: sigaction = std::mem::zeroed();
        act.sa_sigaction = trampoline as usize;
        act.sa_flags = SA_SIGINFO;
        libc::sigemptyset(&mut act.sa_mask);
        let mut prev: sigaction = std::mem::zeroed();
        let rc = libc::sigaction(SIGSEGV, &act, &mut prev);
        assert_eq!(rc, 0, "sigaction(SIGSEGV) failed: {}", std::io::Error::last_os_error());
        PREV.write(prev);
    });
}

extern "C" fn trampoline(_sig: c_int, _info: *mut siginfo_t, ctx: *mut c_void) {
    // SAFETY: the kernel only ever invokes this as a SA_SIGINFO handler, with `ctx`
    // pointing at a valid `ucontext_t` for the faulting thread.
    let gregs = unsafe { &mut (*ctx.cast::<ucontext_t>()).uc_mcontext.gregs };
    let host_pc = gregs[libc::REG_RIP as usize] as usize;
    let regs = FaultRegs {
        host_addr_reg: gregs[libc::REG_R8 as usize] as u64,
        store_value_reg: gregs[libc::REG_RCX as usize] as u64,
    };

    match handler::on_fault(host_pc, regs) {
        FaultAction::Handled { resume_pc, result } => {
            if let Some(value) = result {
                gregs[libc::REG_RAX as usize] = value as i64;
            }
            gregs[libc::REG_RIP as usize] = resume_pc as i64;
        }
        FaultAction::PropagateToNext => {
            // SAFETY: `PREV` was written by `install` before any fault could reach
            // this trampoline. Re-raising after restoring it lets the previously
            // installed handler (ordinarily the OS default) see the same fault.
            unsafe {
                libc::sigaction(SIGSEGV, PREV.as_ptr(), std::ptr::null_mut());
                libc::raise(SIGSEGV);
            }
        }
    }
}
