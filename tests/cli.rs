//! End-to-end tests for the zlogscope binary.
//!
//! Each test builds a scratch directory holding a node log, a symbol table
//! and a `zlogscope.toml`, then drives the CLI from inside that directory.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const LOOKUP_LOG: &str = "\
[INFO ][ 5386][19-02-07T21:37:06.100000][ckProcessing.cpp:788][ProcessStateDeltaFro] BEG
[INFO ][ 5386][19-02-07T21:37:06.200000][ckProcessing.cpp:790][ProcessStateDeltaFro] applying state delta
 for epoch 12
[DEBUG][ 5386][19-02-07T21:37:06.300000][ence/BlockStorage.cpp:50][PutBlock] BEG
[DEBUG][ 5386][19-02-07T21:37:06.800000][ence/BlockStorage.cpp:60][PutBlock] END
[WARNING][ 7001][19-02-07T21:37:07.000000][Server.cpp:160][CreateTransaction] balance too low
[INFO ][ 5386][19-02-07T21:37:08.600000][ckProcessing.cpp:830][ProcessStateDeltaFro] END
[INFO ][ 5386][19-02-07T21:37:09.000000] truncated header
";

const SYMBOLS: &str = "\
ProcessStateDeltaFromFinalBlock\tlibNode/FinalBlockProcessing.cpp\t780
ProcessStateDeltaFromFinalBlockOld\tlibNode/FinalBlockProcessing.cpp\t900
PutBlock\tlibPersistence/BlockStorage.cpp\t50
";

const CONFIG: &str = r#"
index_dir = "idx"
symbols = "tags.tsv"
workers = 2
"#;

/// Run zlogscope inside `dir`
fn zlogscope(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_zlogscope"))
        .args(args)
        .current_dir(dir)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run zlogscope")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Scratch dir with `lookup-1.log` already indexed
fn indexed() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(dir.path().join("lookup-1.log"), LOOKUP_LOG).unwrap();
    fs::write(dir.path().join("tags.tsv"), SYMBOLS).unwrap();
    fs::write(dir.path().join("zlogscope.toml"), CONFIG).unwrap();

    let output = zlogscope(dir.path(), &["index", "lookup-1.log"]);
    assert!(output.status.success(), "index failed: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("files:    1"), "unexpected output: {out}");
    assert!(out.contains("entries:  6"), "unexpected output: {out}");
    assert!(
        out.contains("levels:   DEBUG 2  INFO 3  WARNING 1  FATAL 0"),
        "unexpected output: {out}"
    );
    dir
}

#[test]
fn test_list_nodes_and_values() {
    let dir = indexed();

    let nodes = zlogscope(dir.path(), &["ls", "node"]);
    assert!(nodes.status.success());
    assert_eq!(stdout(&nodes).trim(), "lookup-1");

    let tids = zlogscope(dir.path(), &["ls", "tid", "lookup-1"]);
    assert_eq!(stdout(&tids).lines().collect::<Vec<_>>(), vec!["5386", "7001"]);

    let levels = zlogscope(dir.path(), &["ls", "level", "lookup-1"]);
    let levels = stdout(&levels);
    assert!(levels.contains("DEBUG") && levels.contains("WARNING"));

    let missing_node = zlogscope(dir.path(), &["ls", "tid"]);
    assert!(!missing_node.status.success());
}

#[test]
fn test_list_functions_recovered() {
    let dir = indexed();

    let plain = stdout(&zlogscope(dir.path(), &["ls", "function", "lookup-1"]));
    assert!(plain.contains("ProcessStateDeltaFro"));
    assert!(!plain.contains("FinalBlock"));

    let recovered = stdout(&zlogscope(dir.path(), &["ls", "function", "lookup-1", "--recover"]));
    assert!(recovered.contains("ProcessStateDeltaFro[mFinalBlock]"));
    assert!(recovered.contains("libNode/FinalBlockProcessing.cpp:788"));
    assert!(recovered.contains("libPersistence/BlockStorage.cpp:50"));

    // Resolved symbols are kept next to the table and reused
    assert!(dir.path().join("tags.tsv.cache.json").is_file());
    let again = stdout(&zlogscope(dir.path(), &["ls", "function", "lookup-1", "--recover"]));
    assert_eq!(again, recovered);
}

#[test]
fn test_query_search_and_range() {
    let dir = indexed();

    let query = zlogscope(dir.path(), &["query", "lookup-1", "tid = 7001"]);
    assert!(query.status.success(), "{}", stderr(&query));
    let rows = stdout(&query);
    assert_eq!(rows.lines().count(), 1);
    assert!(rows.starts_with("WARNING   7001  2019-02-07 21:37:07.000000"));
    assert!(rows.contains("balance too low"));

    let search = stdout(&zlogscope(dir.path(), &["search", "lookup-1", "bal*"]));
    assert_eq!(search.lines().count(), 1);

    let both = stdout(&zlogscope(dir.path(), &["search", "lookup-1", "delta", "OR", "balance"]));
    assert!(both.contains("applying state delta\n for epoch 12"));
    assert!(both.contains("balance too low"));

    let range = zlogscope(
        dir.path(),
        &[
            "range",
            "lookup-1",
            "-s",
            "2019-02-07 21:37:06.250",
            "-e",
            "2019-02-07T21:37:07",
        ],
    );
    assert!(range.status.success(), "{}", stderr(&range));
    assert_eq!(stdout(&range).lines().count(), 3);

    let everything = stdout(&zlogscope(dir.path(), &["range", "lookup-1"]));
    // The continuation line belongs to the second entry's message
    assert_eq!(everything.lines().count(), 7);

    let bad_sql = zlogscope(dir.path(), &["query", "lookup-1", "no_such_column = 1"]);
    assert!(!bad_sql.status.success());
}

#[test]
fn test_callstack() {
    let dir = indexed();

    let output = zlogscope(
        dir.path(),
        &[
            "callstack",
            "lookup-1",
            "5386",
            "ProcessStateDeltaFromFinalBlock",
            "-t",
            "2019-02-07 21:37:00",
        ],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    let lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(
        lines,
        vec![
            "Displaying Call Stack of ProcessStateDeltaFromFinalBlock() in thread 5386",
            "BEGIN  ProcessStateDeltaFromFinalBlock()        [21:37:06.1]  [libNode/FinalBlockProcessing.cpp:788]",
            "    | [INFO]  ProcessStateDeltaFromFinalBlock()        [21:37:06.2]  [libNode/FinalBlockProcessing.cpp:790]",
            "    | BEGIN  PutBlock()        [21:37:06.3]  [libPersistence/BlockStorage.cpp:50]",
            "    | END  PutBlock()        [duration:0.50s  21:37:06.8]  [libPersistence/BlockStorage.cpp:60]",
            "END  ProcessStateDeltaFromFinalBlock()        [duration:2.50s  21:37:08.6]  [libNode/FinalBlockProcessing.cpp:830]",
        ]
    );

    let with_msg = stdout(&zlogscope(
        dir.path(),
        &["callstack", "lookup-1", "5386", "ProcessStateDeltaFro", "-t", "2019-02-07", "-m"],
    ));
    assert!(with_msg.contains("    |     applying state delta\n    |      for epoch 12"));
}

#[test]
fn test_callstack_entry_not_found() {
    let dir = indexed();
    let output = zlogscope(dir.path(), &["callstack", "lookup-1", "7001", "PutBlock"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Stack entry not found"));

    let unknown_node = zlogscope(dir.path(), &["callstack", "ds-9", "1", "PutBlock"]);
    assert!(!unknown_node.status.success());
    assert!(stderr(&unknown_node).contains("node 'ds-9' is not indexed"));
}

#[test]
fn test_callstack_strict_mismatch() {
    let dir = indexed();
    fs::write(
        dir.path().join("normal-2.log"),
        "\
[INFO ][ 9][19-02-07T10:00:00.000000][ckProcessing.cpp:788][ProcessStateDeltaFro] BEG
[INFO ][ 9][19-02-07T10:00:01.000000][ence/BlockStorage.cpp:60][PutBlock] END
",
    )
    .unwrap();
    let index = zlogscope(dir.path(), &["index", "normal-2.log"]);
    assert!(index.status.success(), "{}", stderr(&index));

    let args = ["callstack", "normal-2", "9", "ProcessStateDeltaFro", "-t", "2019-02-07"];
    let lenient = zlogscope(dir.path(), &args);
    assert!(lenient.status.success(), "{}", stderr(&lenient));
    assert!(stdout(&lenient).contains("    | Unmatched function end:\n    | END  PutBlock()"));

    let mut strict_args = args.to_vec();
    strict_args.push("--strict");
    let strict = zlogscope(dir.path(), &strict_args);
    assert!(!strict.status.success());
    assert!(stderr(&strict).contains("Unmatched function end:"));
}

#[test]
fn test_index_errors() {
    let dir = indexed();

    let missing = zlogscope(dir.path(), &["index", "nope.log"]);
    assert!(!missing.status.success());
    assert!(stderr(&missing).contains("does not exist or is not a file"));

    let again = zlogscope(dir.path(), &["index", "lookup-1.log"]);
    assert!(!again.status.success());
    assert!(stderr(&again).contains("1 of 1 files failed to index"));

    let overwrite = zlogscope(dir.path(), &["index", "--overwrite", "lookup-1.log"]);
    assert!(overwrite.status.success(), "{}", stderr(&overwrite));
}

#[test]
fn test_index_rejects_two_logs_of_one_node() {
    let dir = indexed();
    fs::create_dir(dir.path().join("old")).unwrap();
    fs::write(dir.path().join("old/lookup-1.log"), LOOKUP_LOG).unwrap();

    let output = zlogscope(
        dir.path(),
        &["index", "--overwrite", "lookup-1.log", "old/lookup-1.log"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("are both logs of node 'lookup-1'"));

    // The same file named twice is indexed once
    let twice = zlogscope(
        dir.path(),
        &["index", "--overwrite", "lookup-1.log", "lookup-1.log"],
    );
    assert!(twice.status.success(), "{}", stderr(&twice));
    assert!(stdout(&twice).contains("files:    1"));
}

#[test]
fn test_flags_override_config() {
    let dir = indexed();

    let elsewhere = zlogscope(dir.path(), &["--index-dir", "other", "ls", "node"]);
    assert!(!elsewhere.status.success());
    assert!(stderr(&elsewhere).contains("does not exist"));

    let no_config = zlogscope(dir.path(), &["--config", "missing.toml", "ls", "node"]);
    assert!(!no_config.status.success());
}
