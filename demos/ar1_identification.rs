//! Identifies a scalar AR(1) decay rate from noiseless observations.

use roukf::{FilterOps, OperatorStatus, RoukfFilter, SigmaDistribution};

fn main() {
    pretty_env_logger::init();

    let true_theta = 0.9_f64;
    let mut filter =
        RoukfFilter::new(1, 1, 1, &[1.0], &[10.0], SigmaDistribution::Canonic, None)
            .expect("valid filter dimensions");
    filter.set_state(&[1.0]).unwrap();

    let mut z = 1.0_f64;
    let mut forward = |state: &mut [f64], params: &mut [f64]| -> OperatorStatus {
        state[0] *= params[0];
        OperatorStatus::Success
    };
    let mut observe = |state: &[f64], obs: &mut [f64]| obs[0] = state[0];

    for step in 0..200 {
        let error = filter
            .execute_step(&[z], &mut forward, &mut observe)
            .expect("well-conditioned step");
        z *= true_theta;

        if step % 20 == 0 {
            log::info!(
                "step {step}: error = {error:.6}, theta_hat = {:.6}",
                filter.parameters().unwrap()[0]
            );
        }
    }

    println!(
        "true theta = {true_theta}, estimated theta = {:.6}",
        filter.parameters().unwrap()[0]
    );
}
