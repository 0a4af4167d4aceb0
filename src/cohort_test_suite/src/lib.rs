//! Test suite for kernels implementing the [`cohort_core`] kernel traits.
//!
//! Each module in [`kernel_tests`] sets up a scenario on a fresh kernel. The
//! scenario reports its outcome through a [`kernel_tests::Driver`], and a
//! kernel implementation runs every scenario by instantiating
//! [`get_kernel_tests!`] in its own test crate.
pub mod utils;

/// Invoke the specified macro with a list of all test cases, each in the
/// form `{ path: <module path>, name_ident: <identifier>, }`.
///
/// ```rust,ignore
/// macro_rules! instantiate_kernel_tests {
///     ( $( { path: $path:path, name_ident: $name_ident:ident, }, )* ) => { /* ... */ };
/// }
/// cohort_test_suite::get_kernel_tests!(instantiate_kernel_tests!());
/// ```
#[macro_export]
macro_rules! get_kernel_tests {
    ( $cb:ident!( $($pre:tt)* ) ) => {
        $cb!(
            $($pre)*
            { path: $crate::kernel_tests::basic, name_ident: basic, },
            { path: $crate::kernel_tests::mutex_exclusion, name_ident: mutex_exclusion, },
            { path: $crate::kernel_tests::mutex_timeout, name_ident: mutex_timeout, },
            { path: $crate::kernel_tests::queue_fifo, name_ident: queue_fifo, },
            { path: $crate::kernel_tests::queue_timeout, name_ident: queue_timeout, },
            { path: $crate::kernel_tests::task_delete, name_ident: task_delete, },
            { path: $crate::kernel_tests::task_suspend_resume, name_ident: task_suspend_resume, },
            { path: $crate::kernel_tests::timer_context, name_ident: timer_context, },
            { path: $crate::kernel_tests::timer_one_shot, name_ident: timer_one_shot, },
            { path: $crate::kernel_tests::timer_periodic, name_ident: timer_periodic, },
        );
    };
}
