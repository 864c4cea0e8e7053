//! Static chain validation: `devchain check`.

use anyhow::Result;
use std::path::PathBuf;

use super::super::Cli;

pub fn cmd_check(cli: &Cli, root_dir: PathBuf) -> Result<()> {
    use devchain::chain::ChainPlan;
    use devchain::config::Config;
    use devchain::phase::PhaseRegistry;

    let config = Config::new(root_dir, cli.overrides())?;
    let company = config.load_company()?;
    let registry = PhaseRegistry::from_company(&company.phases, &company.roles)?;
    let plan = ChainPlan::compile(&company.chain.chain, &registry)?;

    println!();
    println!("{}", console::style("Chain configuration").bold().cyan());
    println!("  source: {}", company.source);
    println!("  phases: {}", registry.simple_names().len());
    if !company.chain.recruitments.is_empty() {
        println!("  recruitments: {}", company.chain.recruitments.join(", "));
    }
    println!();
    print!("{}", plan);
    println!();
    println!(
        "{} {} step(s) resolved",
        console::style("OK:").green().bold(),
        plan.len()
    );
    Ok(())
}
