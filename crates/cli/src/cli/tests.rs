use clap::Parser;
use serde_json::json;

use super::*;

#[test]
fn parse_relay_command() {
	let args = vec![
		"dbgmux",
		"relay",
		"--listen",
		"0.0.0.0:9444",
		"--target",
		"ws://127.0.0.1:9222/devtools/page/ABC",
	];
	let cli = Cli::try_parse_from(args).unwrap();

	match cli.command {
		Commands::Relay(args) => {
			assert_eq!(args.listen, "0.0.0.0:9444".parse().unwrap());
			assert_eq!(args.target, "ws://127.0.0.1:9222/devtools/page/ABC");
			assert_eq!(args.protocol_version, "1.3");
		}
		_ => panic!("Expected Relay command"),
	}
}

#[test]
fn relay_options_carry_protocol_version() {
	let args = vec![
		"dbgmux",
		"relay",
		"--target",
		"ws://localhost:9222/devtools/browser/X",
		"--protocol-version",
		"1.2",
	];
	let cli = Cli::try_parse_from(args).unwrap();

	match cli.command {
		Commands::Relay(args) => assert_eq!(args.bridge_options().protocol_version, "1.2"),
		_ => panic!("Expected Relay command"),
	}
}

#[test]
fn parse_probe_defaults() {
	let args = vec!["dbgmux", "probe", "--target", "ws://127.0.0.1:9222/devtools/page/ABC"];
	let cli = Cli::try_parse_from(args).unwrap();

	match cli.command {
		Commands::Probe(args) => {
			assert_eq!(args.method, "Browser.getVersion");
			assert_eq!(args.params, json!({}));
			assert_eq!(args.session_id, None);
			assert_eq!(args.timeout(), Duration::from_secs(10));
		}
		_ => panic!("Expected Probe command"),
	}
}

#[test]
fn parse_probe_with_params() {
	let args = vec![
		"dbgmux",
		"probe",
		"Runtime.evaluate",
		"--target",
		"ws://127.0.0.1:9222/devtools/page/ABC",
		"--params",
		r#"{"expression": "1+1"}"#,
		"--session-id",
		"S-1",
	];
	let cli = Cli::try_parse_from(args).unwrap();

	match cli.command {
		Commands::Probe(args) => {
			assert_eq!(args.method, "Runtime.evaluate");
			assert_eq!(args.params, json!({"expression": "1+1"}));
			assert_eq!(args.session_id.as_deref(), Some("S-1"));
		}
		_ => panic!("Expected Probe command"),
	}
}

#[test]
fn probe_rejects_non_object_params() {
	for params in ["[1, 2]", "{not json"] {
		let args = vec![
			"dbgmux",
			"probe",
			"--target",
			"ws://127.0.0.1:9222/devtools/page/ABC",
			"--params",
			params,
		];
		assert!(Cli::try_parse_from(args).is_err(), "accepted {params}");
	}
}

#[test]
fn verbose_flag_counts() {
	let args = vec![
		"dbgmux",
		"-vv",
		"probe",
		"--target",
		"ws://127.0.0.1:9222/devtools/page/ABC",
	];
	let cli = Cli::try_parse_from(args).unwrap();
	assert_eq!(cli.verbose, 2);

	let args = vec![
		"dbgmux",
		"relay",
		"--target",
		"ws://127.0.0.1:9222/devtools/page/ABC",
		"--verbose",
	];
	let cli = Cli::try_parse_from(args).unwrap();
	assert_eq!(cli.verbose, 1);
}
