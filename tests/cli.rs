use assert_cmd::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn write_config(xml: &str) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("temp config");
    tmp.write_all(xml.as_bytes()).expect("write config");
    tmp.flush().expect("flush config");
    tmp
}

#[test]
fn summary_only_reports_enabled_effect() {
    let config = write_config(
        r#"<viewer>
  <hologram enabled="true">
    <opacity>0.5</opacity>
    <color>#ff0000</color>
  </hologram>
</viewer>
"#,
    );

    let mut cmd = Command::cargo_bin("hologram-viewer").expect("binary");
    cmd.arg(config.path()).arg("--summary-only").arg("--frames").arg("30");
    cmd.assert()
        .success()
        .stdout(contains("Model: default (3 mesh(es))"))
        .stdout(contains("Hologram effect: enabled on 3 mesh(es)"))
        .stdout(contains("Elapsed: 0.50s"))
        .stdout(contains(" - color: #ff0000"))
        .stdout(contains(" - opacity: 0.50"));
}

#[test]
fn summary_only_without_config_keeps_effect_off() {
    let mut cmd = Command::cargo_bin("hologram-viewer").expect("binary");
    cmd.arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Hologram effect: disabled"))
        .stdout(contains(" - rimPower: 2.00"));
}

#[test]
fn missing_model_falls_back_to_placeholder() {
    let config = write_config(
        r#"<viewer>
  <model><source>does-not-exist.glb</source><scale>2</scale></model>
  <hologram enabled="true"/>
</viewer>
"#,
    );

    let mut cmd = Command::cargo_bin("hologram-viewer").expect("binary");
    cmd.arg(config.path()).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Hologram effect: enabled on 3 mesh(es)"));
}

#[test]
fn invalid_parameter_in_config_fails() {
    let config = write_config(
        r#"<viewer><hologram enabled="true"><opacity>1.4</opacity></hologram></viewer>"#,
    );

    let mut cmd = Command::cargo_bin("hologram-viewer").expect("binary");
    cmd.arg(config.path()).arg("--summary-only");
    cmd.assert()
        .failure()
        .stderr(contains("failed to load config"));
}

#[test]
fn unknown_flag_is_rejected() {
    let mut cmd = Command::cargo_bin("hologram-viewer").expect("binary");
    cmd.arg("--fullscreen");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --fullscreen"));
}
