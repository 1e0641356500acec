//! Over successive informative steps on a well-posed problem, the estimated
//! parameter variance `diag(1/U)` should shrink component-wise.

use roukf::{FilterOps, OperatorStatus, RoukfFilter, SigmaDistribution};

#[test]
fn parameter_variance_is_non_increasing_over_informative_steps() {
    let mut filter = RoukfFilter::new(
        1,
        1,
        1,
        &[1.0],
        &[10.0],
        SigmaDistribution::Canonic,
        None,
    )
    .unwrap();
    filter.set_state(&[1.0]).unwrap();

    let true_theta = 0.9_f64;
    let mut z = 1.0_f64;
    let mut forward = |state: &mut [f64], params: &mut [f64]| -> OperatorStatus {
        state[0] *= params[0];
        OperatorStatus::Success
    };
    let mut observe = |state: &[f64], obs: &mut [f64]| obs[0] = state[0];

    let mut prev_std = filter.parameters_std()[0];
    for _ in 0..500 {
        filter
            .execute_step(&[z], &mut forward, &mut observe)
            .unwrap();
        z *= true_theta;

        let curr_std = filter.parameters_std()[0];
        assert!(
            curr_std <= prev_std + 1e-12,
            "parameter std grew from {prev_std} to {curr_std}"
        );
        prev_std = curr_std;
    }
}
