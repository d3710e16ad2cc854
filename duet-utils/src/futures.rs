//! Support for asynchronous (`async`/`await`) code

use core::{
    pin::pin,
    task::{Context, Poll, RawWaker, RawWakerVTable, Waker},
};

use duet::SchedulerHandle;

const RAW_WAKER_VTABLE: RawWakerVTable = RawWakerVTable::new(
    raw_waker_clone,
    raw_waker_wake,
    raw_waker_wake_by_ref,
    raw_waker_drop,
);

/// Executes a `Future` on the user context and blocks until it completes.
///
/// While the future is pending the user context is suspended, so the platform
/// keeps ticking. Waking the future requests the next user activation.
///
/// Returns `None` if the scheduler is stopped before the future completes.
/// Aborts the process if called outside the user context.
pub fn block_on<F: Future>(handle: &SchedulerHandle, fut: F) -> Option<F::Output> {
    // Each waker owns its own boxed handle, so it may outlive this call.
    let data = Box::into_raw(Box::new(handle.clone()));
    // SAFETY: `data` is a valid `Box<SchedulerHandle>` pointer and the vtable treats it as one.
    let waker = unsafe { Waker::from_raw(RawWaker::new(data as *const (), &RAW_WAKER_VTABLE)) };
    let mut context = Context::from_waker(&waker);

    let mut fut = pin!(fut);

    loop {
        match fut.as_mut().poll(&mut context) {
            Poll::Ready(ret) => break Some(ret),
            // Nothing polls the platform side any more
            Poll::Pending if handle.is_stopping() => break None,
            Poll::Pending => handle.suspend(),
        }
    }
}

unsafe fn raw_waker_clone(data: *const ()) -> RawWaker {
    let handle = unsafe { &*(data as *const SchedulerHandle) };
    let data = Box::into_raw(Box::new(handle.clone()));
    RawWaker::new(data as *const (), &RAW_WAKER_VTABLE)
}

unsafe fn raw_waker_wake(data: *const ()) {
    let handle = unsafe { Box::from_raw(data as *mut SchedulerHandle) };
    handle.schedule();
}

unsafe fn raw_waker_wake_by_ref(data: *const ()) {
    let handle = unsafe { &*(data as *const SchedulerHandle) };
    handle.schedule();
}

unsafe fn raw_waker_drop(data: *const ()) {
    drop(unsafe { Box::from_raw(data as *mut SchedulerHandle) });
}
