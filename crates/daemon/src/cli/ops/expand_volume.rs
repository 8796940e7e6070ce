use std::convert::Infallible;

use clap::Args;

use common::prelude::DriverStatus;

/// Volume expansion is not something a bucket mount can do.
#[derive(Args, Debug, Clone)]
pub struct ExpandVolume {
    /// Arguments passed by the orchestrator, ignored
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<String>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for ExpandVolume {
    type Error = Infallible;
    type Output = DriverStatus;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        Ok(DriverStatus::unsupported("expandvolume"))
    }
}
