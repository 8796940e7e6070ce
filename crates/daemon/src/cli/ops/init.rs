use std::convert::Infallible;

use clap::Args;

use common::prelude::{DriverCapabilities, DriverStatus};

#[derive(Args, Debug, Clone)]
pub struct Init;

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = Infallible;
    type Output = DriverStatus;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        Ok(
            DriverStatus::success("No initialization required").with_capabilities(
                DriverCapabilities {
                    attach: false,
                    selinux_relabel: false,
                },
            ),
        )
    }
}
