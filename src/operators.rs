//! The forward and observation operators supplied by the caller.
//!
//! Both are offered in a safe, typed-slice trait form for in-process Rust
//! clients, and a raw-pointer/length form for native or foreign-language
//! clients (`int (*)(double*, int, double*, int)` and `void (*)(double*,
//! int, double*, int)` C signatures). The raw form is a thin `unsafe`
//! adapter over the safe trait; the filter itself only ever calls the trait
//! methods.

/// Outcome of one forward-operator invocation for a single sigma column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorStatus {
    /// Nonzero return code in the C-ABI convention.
    Success,
    /// Zero return code in the C-ABI convention.
    Failure,
}

/// State transition and parameter-dynamics operator, `A(x, θ) -> x'`.
///
/// Implementations write the propagated state and problem-space parameters
/// back into the buffers they were given; both buffers must be written in
/// full (partial writes followed by `Success` are a caller bug, not
/// detectable here).
pub trait ForwardOperator {
    fn forward(&mut self, state: &mut [f64], params: &mut [f64]) -> OperatorStatus;
}

/// Observation operator, `H(x, z) -> z`, mapping state to measurement space.
pub trait ObservationOperator {
    fn observe(&mut self, state: &[f64], observation: &mut [f64]);
}

impl<F> ForwardOperator for F
where
    F: FnMut(&mut [f64], &mut [f64]) -> OperatorStatus,
{
    fn forward(&mut self, state: &mut [f64], params: &mut [f64]) -> OperatorStatus {
        self(state, params)
    }
}

impl<F> ObservationOperator for F
where
    F: FnMut(&[f64], &mut [f64]),
{
    fn observe(&mut self, state: &[f64], observation: &mut [f64]) {
        self(state, observation)
    }
}

/// Raw-pointer forward-operator signature for foreign or C-ABI callers.
/// Nonzero return means success, zero means failure, per the documented
/// external convention.
pub type RawForwardFn =
    unsafe extern "C" fn(*mut f64, usize, *mut f64, usize) -> i32;

/// Raw-pointer observation-operator signature for foreign or C-ABI callers.
pub type RawObservationFn = unsafe extern "C" fn(*const f64, usize, *mut f64, usize);

/// Adapts a [`RawForwardFn`] to the safe [`ForwardOperator`] trait.
pub struct RawForwardOperator(pub RawForwardFn);

impl ForwardOperator for RawForwardOperator {
    fn forward(&mut self, state: &mut [f64], params: &mut [f64]) -> OperatorStatus {
        let code = unsafe {
            (self.0)(
                state.as_mut_ptr(),
                state.len(),
                params.as_mut_ptr(),
                params.len(),
            )
        };
        if code != 0 {
            OperatorStatus::Success
        } else {
            OperatorStatus::Failure
        }
    }
}

/// Adapts a [`RawObservationFn`] to the safe [`ObservationOperator`] trait.
pub struct RawObservationOperator(pub RawObservationFn);

impl ObservationOperator for RawObservationOperator {
    fn observe(&mut self, state: &[f64], observation: &mut [f64]) {
        unsafe {
            (self.0)(
                state.as_ptr(),
                state.len(),
                observation.as_mut_ptr(),
                observation.len(),
            )
        }
    }
}
