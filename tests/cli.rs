use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn runs() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.assert().success();
}

#[test]
fn outputs_tool_name() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.arg("-V");
    cmd.assert().success().stdout("detbridge 0.1.0\n");
}

// Convert subcommand tests

#[test]
fn convert_ltwh_pixel_file() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args([
        "convert",
        "tests/fixtures/boxes_ltwh.csv",
        "--mode",
        "LTWH",
        "--type",
        "pixel",
        "--height",
        "100",
        "--width",
        "100",
    ]);
    cmd.assert().success().stdout("10,10,30,30\n0,0,5,5\n");
}

#[test]
fn convert_reads_stdin() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args([
        "convert", "--mode", "CCWH", "--type", "pixel", "--height", "10", "--width", "10",
    ]);
    cmd.write_stdin("5,5,4,4\n");
    cmd.assert().success().stdout("3,3,7,7\n");
}

#[test]
fn convert_without_metadata_uses_heuristic() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args([
        "convert",
        "tests/fixtures/boxes_fractional.csv",
        "--height",
        "100",
        "--width",
        "100",
    ]);
    cmd.assert().success().stdout("40,40,60,60\n");
}

#[test]
fn convert_rejects_unknown_mode() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args([
        "convert",
        "tests/fixtures/boxes_ltwh.csv",
        "--mode",
        "XYWH",
        "--type",
        "pixel",
        "--height",
        "100",
        "--width",
        "100",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported bounding box format"));
}

#[test]
fn convert_rejects_wrong_column_count() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args(["convert", "--height", "10", "--width", "10"]);
    cmd.write_stdin("1,2,3\n");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("expected shape (N, 4)"));
}

// Inspect subcommand tests

#[test]
fn inspect_prints_instance_counts() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args(["inspect", "tests/fixtures/store_valid.json"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "Train dataset with number of images 2, and instance counts:",
        ))
        .stdout(predicate::str::contains("| 0 [cat]  | 1     |"))
        .stdout(predicate::str::contains("| 1 [dog]  | 2     |"));
}

#[test]
fn inspect_unknown_tensor_fails() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args([
        "inspect",
        "tests/fixtures/store_valid.json",
        "--boxes",
        "detections",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Unknown tensor 'detections'"));
}

// Validate subcommand tests

#[test]
fn validate_valid_store_succeeds() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args(["validate", "tests/fixtures/store_valid.json"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Validation passed"));
}

#[test]
fn validate_invalid_store_fails() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args(["validate", "tests/fixtures/store_invalid.json"]);
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("error(s)"))
        .stdout(predicate::str::contains("BBoxOutOfBounds"))
        .stdout(predicate::str::contains("LabelOutOfRange"));
}

#[test]
fn validate_warnings_fail_in_strict_mode() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args(["validate", "tests/fixtures/store_no_coords.json"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("FormatInferred"));

    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args(["validate", "tests/fixtures/store_no_coords.json", "--strict"]);
    cmd.assert().failure();
}

#[test]
fn validate_json_output_format() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args([
        "validate",
        "tests/fixtures/store_valid.json",
        "--output",
        "json",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"error_count\": 0"))
        .stdout(predicate::str::contains("\"warning_count\": 0"));
}

#[test]
fn validate_nonexistent_file_fails() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args(["validate", "nonexistent_file.json"]);
    cmd.assert().failure();
}

// Plan subcommand tests

#[test]
fn plan_prints_json() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args(["plan", "tests/fixtures/train_config.yaml"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"dataloader\": \"python\""))
        .stdout(predicate::str::contains("\"runner_type\": \"EpochBasedRunner\""))
        .stdout(predicate::str::contains("\"validation\"").not());
}

#[test]
fn plan_with_validation_replaces_image_to_tensor() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args([
        "plan",
        "tests/fixtures/train_config.yaml",
        "--validate",
        "--native-available",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"dataloader\": \"c++\""))
        .stdout(predicate::str::contains("\"validation\""))
        .stdout(predicate::str::contains("ImageToTensor").not());
}

#[test]
fn plan_against_store_lists_tensors() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args([
        "plan",
        "tests/fixtures/train_config.yaml",
        "--store",
        "tests/fixtures/store_valid.json",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"train_loader_plan\""))
        .stdout(predicate::str::contains("\"categories\""))
        .stdout(predicate::str::contains("LoadImageFromFile").count(1));
}

#[test]
fn plan_rejects_unknown_dataloader() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args([
        "plan",
        "tests/fixtures/train_config.yaml",
        "--dataloader",
        "rust",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid dataloader implementation"));
}

#[test]
fn plan_rejects_unknown_config_extension() {
    let mut cmd = Command::cargo_bin("detbridge").unwrap();
    cmd.args(["plan", "tests/fixtures/boxes_ltwh.csv"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported format"));
}
