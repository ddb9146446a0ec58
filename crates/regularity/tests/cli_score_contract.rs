use assert_cmd::Command;

fn regularity() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("regularity"));
    // Keep the run hermetic: the bigram model never leaves the process.
    cmd.env_remove("REGULARITY_MODEL")
        .env_remove("REGULARITY_MODEL_TIMEOUT_MS");
    cmd
}

fn stdout_json(out: &std::process::Output) -> serde_json::Value {
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("parse score json")
}

#[test]
fn score_echoes_request_and_bounds_regularity() {
    let out = regularity()
        .args([
            "score",
            "--model",
            "bigram",
            "--text",
            "the cat sat . the cat sat .",
        ])
        .output()
        .unwrap();
    let v = stdout_json(&out);
    assert_eq!(v["request"]["project"], "bigram");
    assert_eq!(v["request"]["text"], "the cat sat . the cat sat .");
    let r = v["regularity"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&r));
    // The second sentence repeats the first, so it is fully predicted.
    assert!(r >= 0.5, "regularity {r}");
}

#[test]
fn score_single_token_is_zero() {
    for text in ["", "hello"] {
        let out = regularity()
            .args(["score", "--model", "bigram", "--text", text])
            .output()
            .unwrap();
        let v = stdout_json(&out);
        assert_eq!(v["regularity"], 0.0, "text {text:?}");
    }
}

#[test]
fn score_reads_stdin_when_no_text_given() {
    let out = regularity()
        .args(["score", "--model", "bigram"])
        .write_stdin("a b a b")
        .output()
        .unwrap();
    let v = stdout_json(&out);
    assert_eq!(v["request"]["text"], "a b a b");
}

#[test]
fn score_reads_file() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("input.txt");
    std::fs::write(&p, "of the of the").unwrap();
    let out = regularity()
        .args(["score", "--model", "bigram", "--file"])
        .arg(&p)
        .output()
        .unwrap();
    let v = stdout_json(&out);
    assert_eq!(v["request"]["text"], "of the of the");
    // "the" backs off into the frequent list; "of" and "the" repeat.
    assert_eq!(v["regularity"], 1.0);
}

#[test]
fn score_detail_reports_every_token() {
    let out = regularity()
        .args([
            "score", "--model", "bigram", "--top-k", "3", "--detail", "--text", "x y x y",
        ])
        .output()
        .unwrap();
    let v = stdout_json(&out);
    let result = &v["result"];
    assert_eq!(result["top_k"], 3);
    let tokens = result["tokens"].as_array().unwrap();
    assert_eq!(tokens.len(), 4);
    assert_eq!(tokens[3]["token"], "y");
    assert_eq!(tokens[3]["rank"], 0);
}

#[test]
fn score_rejects_text_and_file_together() {
    regularity()
        .args(["score", "--text", "a", "--file", "b.txt"])
        .assert()
        .failure();
}
