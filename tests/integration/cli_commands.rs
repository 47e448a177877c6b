#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use microtile::cli::graph_json::{
    read_document, write_document, CellDocument, LinkDocument, NodeDocument, PointDocument,
};
use serde_json::Value;
use tempfile::TempDir;

fn sample_document() -> CellDocument {
    CellDocument {
        lon_idx: 1085,
        lat_idx: 3850,
        divisor: 80,
        nodes: vec![
            NodeDocument {
                lon: 13_562_600,
                lat: 48_125_100,
                elevation: 0,
                tags: None,
                links: vec![
                    LinkDocument {
                        lon: 13_563_000,
                        lat: 48_125_150,
                        reverse: false,
                        tags: Some("highway=residential".into()),
                        geometry: vec![PointDocument {
                            dlon: 200,
                            dlat: 20,
                            dele: 1,
                        }],
                    },
                    LinkDocument {
                        lon: 13_500_000,
                        lat: 48_125_100,
                        reverse: false,
                        tags: Some("highway=motorway".into()),
                        geometry: Vec::new(),
                    },
                ],
            },
            NodeDocument {
                lon: 13_563_000,
                lat: 48_125_150,
                elevation: 0,
                tags: None,
                links: vec![LinkDocument {
                    lon: 13_562_600,
                    lat: 48_125_100,
                    reverse: true,
                    tags: None,
                    geometry: Vec::new(),
                }],
            },
        ],
    }
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("microtile");
        cmd.env("MICROTILE_CONFIG", self.path("missing.toml"))
            .env_remove("RUST_LOG");
        cmd
    }

    fn encode_sample(&self) -> PathBuf {
        let graph = self.path("graph.json");
        let tile = self.path("cell.tile");
        write_document(&graph, &sample_document()).expect("write graph");
        self.cmd()
            .arg("encode")
            .arg(&graph)
            .arg("-o")
            .arg(&tile)
            .assert()
            .success();
        tile
    }
}

fn cell_args() -> [&'static str; 4] {
    ["--lon-idx", "1085", "--lat-idx", "3850"]
}

fn inspect_json(ws: &Workspace, tile: &Path, extra: &[&str]) -> Value {
    let output = ws
        .cmd()
        .args(extra)
        .args(["--format", "json", "inspect"])
        .arg(tile)
        .args(cell_args())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("inspect json")
}

#[test]
fn encode_reports_section_costs() {
    let ws = Workspace::new();
    let graph = ws.path("graph.json");
    write_document(&graph, &sample_document()).unwrap();
    let output = ws
        .cmd()
        .args(["--format", "json", "encode"])
        .arg(&graph)
        .arg("-o")
        .arg(ws.path("cell.tile"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["nodes"], 2);
    assert_eq!(report["skipped_reverse_links"], 1);
    let sections = report["sections"].as_array().unwrap();
    assert!(sections.iter().any(|s| s["name"] == "way-tags"));
    let tile_len = fs::metadata(ws.path("cell.tile")).unwrap().len();
    assert_eq!(report["encoded_len"].as_u64().unwrap() + 4, tile_len);
}

#[test]
fn inspect_counts_links() {
    let ws = Workspace::new();
    let tile = ws.encode_sample();
    let report = inspect_json(&ws, &tile, &[]);
    assert_eq!(report["nodes"], 2);
    assert_eq!(report["forward_links"], 2);
    assert_eq!(report["reverse_links"], 1);
    assert_eq!(report["internal_links"], 2);
    assert_eq!(report["external_links"], 1);
    assert_eq!(report["geometry_points"], 1);
}

#[test]
fn decode_writes_equivalent_document() {
    let ws = Workspace::new();
    let tile = ws.encode_sample();
    let out = ws.path("decoded.json");
    ws.cmd()
        .arg("decode")
        .arg(&tile)
        .args(cell_args())
        .arg("-o")
        .arg(&out)
        .assert()
        .success();
    assert_eq!(read_document(&out).unwrap(), sample_document());
}

#[test]
fn deny_list_from_flag_and_config() {
    let ws = Workspace::new();
    let tile = ws.encode_sample();

    let output = ws
        .cmd()
        .arg("decode")
        .arg(&tile)
        .args(cell_args())
        .args(["--deny-way-tags", "highway=motorway"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let doc: CellDocument = serde_json::from_slice(&output).unwrap();
    assert_eq!(doc.nodes[0].links.len(), 1);

    let config = ws.path("cli.toml");
    fs::write(
        &config,
        "[cell]\ndivisor = 80\n\n[decode]\ndeny_way_tags = [\"highway=motorway\"]\n",
    )
    .unwrap();
    let config_arg = config.to_string_lossy().into_owned();
    let report = inspect_json(&ws, &tile, &["--config", config_arg.as_str()]);
    assert_eq!(report["forward_links"], 1);
    assert_eq!(report["reverse_links"], 1);

    let output = ws
        .cmd()
        .args(["--config", config_arg.as_str(), "decode"])
        .arg(&tile)
        .args(cell_args())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let doc: CellDocument = serde_json::from_slice(&output).unwrap();
    assert_eq!(doc.nodes[0].links.len(), 1);
    assert_eq!(doc.nodes[0].links[0].tags.as_deref(), Some("highway=residential"));
}

#[test]
fn damaged_tile_fails() {
    let ws = Workspace::new();
    let tile = ws.encode_sample();
    let mut bytes = fs::read(&tile).unwrap();
    bytes[1] ^= 0x40;
    fs::write(&tile, &bytes).unwrap();

    let output = ws
        .cmd()
        .arg("inspect")
        .arg(&tile)
        .args(cell_args())
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("checksum mismatch"));
}
