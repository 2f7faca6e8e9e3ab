use crate::context::RunContext;
use crate::fail;
use crate::testing::CheckResult;

pub(super) async fn memcheck(ctx: &RunContext, stress_command: &str) -> CheckResult {
    ctx.set_last_command(stress_command);
    ctx.memcheck()
        .ensure_clean(&ctx.candidate(), stress_command)
        .await
}

pub(super) fn warnings(ctx: &RunContext) -> CheckResult {
    if let Some(warnings) = ctx.compiler_warnings() {
        fail!("Got compiler warnings:\n{}", warnings);
    }
    Ok(())
}
