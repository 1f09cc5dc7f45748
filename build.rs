// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("opkgmirror")
        .version(env!("CARGO_PKG_VERSION"))
        .author("opkgmirror Contributors")
        .about("Mirror upstream release packages into a signed opkg repository")
        .subcommand_required(true)
        .subcommand(
            Command::new("sync")
                .about("Sync all sources and republish the indexes of changed buckets")
                .arg(
                    Arg::new("sources")
                        .short('s')
                        .long("sources")
                        .value_name("PATH")
                        .default_value("repo_sources.json")
                        .help("Path to the source catalog (JSON)"),
                )
                .arg(
                    Arg::new("root")
                        .short('r')
                        .long("root")
                        .value_name("DIR")
                        .default_value("/var/www/opkg_repo")
                        .help("Repository root directory"),
                )
                .arg(
                    Arg::new("key")
                        .short('k')
                        .long("key")
                        .value_name("PATH")
                        .help("usign secret key for index signing"),
                ),
        )
        .subcommand(
            Command::new("publish")
                .about("Rebuild index artifacts for every architecture without syncing")
                .arg(
                    Arg::new("sources")
                        .short('s')
                        .long("sources")
                        .value_name("PATH")
                        .default_value("repo_sources.json")
                        .help("Path to the source catalog (JSON)"),
                )
                .arg(
                    Arg::new("root")
                        .short('r')
                        .long("root")
                        .value_name("DIR")
                        .default_value("/var/www/opkg_repo")
                        .help("Repository root directory"),
                )
                .arg(
                    Arg::new("key")
                        .short('k')
                        .long("key")
                        .value_name("PATH")
                        .help("usign secret key for index signing"),
                ),
        )
        .subcommand(
            Command::new("keygen")
                .about("Generate a usign-compatible Ed25519 keypair")
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("BASENAME")
                        .default_value("repo")
                        .help("Output basename (writes <name>.key and <name>.pub)"),
                )
                .arg(
                    Arg::new("comment")
                        .short('c')
                        .long("comment")
                        .value_name("TEXT")
                        .default_value("opkg repository")
                        .help("Comment embedded in the key files"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("opkgmirror.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
