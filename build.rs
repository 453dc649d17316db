// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn package_path_arg() -> Arg {
    Arg::new("package_path")
        .required(true)
        .value_name("FILE")
        .help("Path to the package file")
}

fn yes_arg() -> Arg {
    Arg::new("yes")
        .short('y')
        .long("yes")
        .action(ArgAction::SetTrue)
        .help("Do not ask for confirmation")
}

fn build_cli() -> Command {
    Command::new("cpkg")
        .version(env!("CARGO_PKG_VERSION"))
        .author("cpkg Contributors")
        .about("Minimal package manager for C headers and libraries")
        .subcommand_required(true)
        .arg(
            Arg::new("root")
                .long("root")
                .value_name("DIR")
                .default_value("/")
                .global(true)
                .help("Root directory packages are deployed under (env: CPKG_ROOT)"),
        )
        .arg(
            Arg::new("work_dir")
                .long("work-dir")
                .value_name("DIR")
                .global(true)
                .help("State directory, default <root>/var/lib/cpkg (env: CPKG_WORK_DIR)"),
        )
        .arg(
            Arg::new("index_url")
                .long("index-url")
                .value_name("URL")
                .global(true)
                .help("URL of the remote package index (env: CPKG_INDEX_URL)"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .default_value("30")
                .global(true)
                .help("Network timeout in seconds"),
        )
        .subcommand(
            Command::new("build")
                .about("Build a package from a source directory containing CPKG/control")
                .arg(Arg::new("source_dir").required(true).help("Package source directory"))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .default_value(".")
                        .help("Directory to write the package to"),
                )
                .arg(yes_arg()),
        )
        .subcommand(
            Command::new("install")
                .about("Install a package file, or a package from the index with --remote")
                .arg(Arg::new("package_path").value_name("FILE").help("Path to the package file"))
                .arg(
                    Arg::new("remote")
                        .long("remote")
                        .value_name("NAME")
                        .help("Fetch the named package from the index and install it"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove an installed package")
                .arg(Arg::new("package_name").required(true).help("Package name to remove"))
                .arg(yes_arg()),
        )
        .subcommand(
            Command::new("info")
                .about("Show the header of a package file")
                .arg(package_path_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print as JSON"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Check a package file's header, length and payload hash")
                .arg(package_path_arg()),
        )
        .subcommand(
            Command::new("list")
                .about("List installed packages")
                .arg(Arg::new("pattern").help("Only show packages whose name contains this text"))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print as JSON"),
                ),
        )
        .subcommand(
            Command::new("listfiles")
                .about("List the files a package deployed")
                .arg(Arg::new("package_name").required(true).help("Installed package name")),
        )
        .subcommand(
            Command::new("search")
                .about("Search the remote index")
                .arg(Arg::new("query").required(true).help("Text to look for in index lines")),
        )
        .subcommand(
            Command::new("fetch")
                .about("Download a package from the index without installing it")
                .arg(Arg::new("package_name").required(true).help("Package name"))
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Destination file (default: <name>.cpk)"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
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
    man.render(&mut buffer)
        .expect("Failed to render man page");

    let man_path = man_dir.join("cpkg.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
