use anyhow::Result;
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use tmlharvest::config::HarvestConfig;
use tmlharvest::harness::run_verify;

#[test]
fn verify_reports_identical_outputs() -> Result<()> {
    let env = setup_fixture_env()?;

    let report = run_verify(&env.config)?;

    assert!(report.identical);
    assert_eq!(report.first_sha256, report.second_sha256);
    assert_eq!(report.files_merged, 3);
    assert_eq!(report.rows, 4);
    assert_eq!(report.columns, 5);
    Ok(())
}

#[test]
fn verify_fails_on_malformed_input() -> Result<()> {
    let env = setup_fixture_env()?;
    fs::write(env.config.paths.originals_path().join("2026.csv"), "a,b\n1,2,3\n")?;

    assert!(run_verify(&env.config).is_err());
    Ok(())
}

struct FixtureEnv {
    _temp: tempfile::TempDir,
    config: HarvestConfig,
}

fn setup_fixture_env() -> Result<FixtureEnv> {
    let temp = tempdir()?;
    let mut config = HarvestConfig::default();
    config.paths.data_dir = temp.path().join("Data");

    let originals = config.paths.originals_path();
    write_file(
        &originals.join("2023.csv"),
        "tourney_name,surface,winner_name\nAustralian Open,Hard,Novak Djokovic\n".as_bytes(),
    )?;
    write_file(
        &originals.join("2024.csv"),
        b"tourney_name,surface,winner_name,score\nRoland Garros,Clay,Carlos Alcaraz,\"3-6 6-3\"\nM\xfcnchen,Clay,Jan-Lennard Struff,7-5\n",
    )?;
    write_file(
        &originals.join("2025.csv"),
        "tourney_name,loser_name\nWimbledon,Jannik Sinner\n".as_bytes(),
    )?;

    Ok(FixtureEnv {
        _temp: temp,
        config,
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}
