//! Context-switch primitive.
//!
//! This is the "external collaborator" of spec §4.2: stack allocation,
//! initializing a machine context that begins executing an entry function,
//! and switching between two contexts. The scheduler depends on exactly
//! four operations (`Stack::new`, `Context::new`, `Context::switch`, drop);
//! nothing else in this crate reaches into `libc::ucontext_t` directly.
//!
//! Implemented via the host's `ucontext.h` family
//! (`getcontext`/`makecontext`/`swapcontext`) — option (a) of spec §9's
//! Design Notes ("use the platform's existing ucontext-like facility").
//! `makecontext` only guarantees `int`-sized varargs, so a 64-bit entry
//! argument is split into two halves and reassembled in the trampoline,
//! the standard trick every hosted ucontext-based coroutine implementation
//! uses for this API.

use std::mem::MaybeUninit;

/// Stack reserved for one thread. Heap-allocated; there is no guard page
/// (stack-overflow detection is an explicit Non-goal).
pub struct Stack {
    buf: Box<[u8]>,
}

impl Stack {
    pub fn new(size: usize) -> Self {
        Stack {
            buf: vec![0u8; size].into_boxed_slice(),
        }
    }

    fn base_and_len(&mut self) -> (*mut libc::c_void, usize) {
        (self.buf.as_mut_ptr() as *mut libc::c_void, self.buf.len())
    }
}

/// A saved machine context plus (while the thread hasn't been switched into
/// yet) the still-pending entry point.
pub struct Context {
    ucontext: Box<libc::ucontext_t>,
}

/// The function a newly created thread begins executing on its own stack.
/// Stored as a trait object behind a raw pointer so it can be threaded
/// through `makecontext`'s `int` varargs as a split pointer.
type Trampoline = Box<dyn FnOnce()>;

extern "C" fn trampoline_entry(arg_hi: u32, arg_lo: u32) {
    let ptr = ((arg_hi as u64) << 32 | arg_lo as u64) as *mut Trampoline;
    // SAFETY: `ptr` was produced by `Box::into_raw` in `Context::new` and
    // is only ever passed to `makecontext` once, so reconstructing the
    // box here and running it exactly once is sound.
    let f = unsafe { Box::from_raw(ptr) };
    f();
    // `entry` returning falls through here; the caller-supplied closure
    // (built in scheduler.rs) always ends by calling `exit()`, which does
    // not return, so this point is unreachable in practice.
    unreachable!("uthread entry point returned without calling exit()");
}

impl Context {
    /// Prepare a context that, once switched into, begins executing `f` on
    /// `stack`.
    pub fn new(stack: &mut Stack, f: impl FnOnce() + 'static) -> Self {
        let mut ucontext = Box::new(unsafe {
            let mut uc = MaybeUninit::<libc::ucontext_t>::zeroed();
            libc::getcontext(uc.as_mut_ptr());
            uc.assume_init()
        });

        let (base, len) = stack.base_and_len();
        ucontext.uc_stack.ss_sp = base;
        ucontext.uc_stack.ss_size = len;
        ucontext.uc_link = std::ptr::null_mut();
        // `swapcontext` restores a context's signal mask along with its
        // registers. Force every freshly made context to start unblocked so
        // a thread's preemptibility is governed solely by `preempt`'s
        // global nesting counter, never by whatever happened to be masked
        // at the moment this context was created.
        unsafe { libc::sigemptyset(&mut ucontext.uc_sigmask) };

        let boxed: Trampoline = Box::new(f);
        let raw = Box::into_raw(Box::new(boxed)) as u64;
        let hi = (raw >> 32) as u32;
        let lo = (raw & 0xffff_ffff) as u32;

        unsafe {
            libc::makecontext(
                ucontext.as_mut(),
                std::mem::transmute::<
                    extern "C" fn(u32, u32),
                    extern "C" fn(),
                >(trampoline_entry),
                2,
                hi,
                lo,
            );
        }

        Context { ucontext }
    }

    /// An empty context used only as the `from` slot of the very first
    /// switch into a thread, or to represent "the context this OS thread
    /// was already running on" (the idle loop's home).
    pub fn empty() -> Self {
        let mut ucontext = Box::new(unsafe {
            let mut uc = MaybeUninit::<libc::ucontext_t>::zeroed();
            libc::getcontext(uc.as_mut_ptr());
            uc.assume_init()
        });
        unsafe { libc::sigemptyset(&mut ucontext.uc_sigmask) };
        Context { ucontext }
    }

    /// Save the caller's state into `self`, resume `to`. Returns only when
    /// some later `switch` targets `self` again.
    pub fn switch(&mut self, to: &mut Context) {
        // SAFETY: both `ucontext_t`s were initialized by `getcontext` and,
        // for non-idle contexts, `makecontext`; `swapcontext` is the
        // documented way to move between them.
        unsafe {
            libc::swapcontext(self.ucontext.as_mut(), to.ucontext.as_mut());
        }
    }
}
