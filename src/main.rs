use anyhow::Context;

fn main() -> anyhow::Result<()> {
    recordforge::run().context("recordforge command failed")
}
