//! Links `libespeak-ng` when the `espeak` feature is enabled; otherwise does
//! nothing.
//!
//! Lookup order:
//!
//! 1. `ESPEAK_LIB_DIR`: required when cross-compiling for iOS / Android.
//! 2. `pkg-config espeak-ng`, with Homebrew's pkgconfig dirs added on macOS.
//! 3. Known system library directories.
//!
//! A static `libespeak-ng.a` is preferred over the shared library.  Static
//! linking also pulls in the C++ runtime, as espeak-ng is written in C++.

use std::env;
use std::path::Path;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=ESPEAK_LIB_DIR");
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");

    if env::var_os("CARGO_FEATURE_ESPEAK").is_none() {
        return;
    }

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    if let Ok(dir) = env::var("ESPEAK_LIB_DIR") {
        let kind = if has_static(&dir) { Kind::Static } else { Kind::Dynamic };
        emit(&dir, kind, &target_os);
        return;
    }

    if matches!(target_os.as_str(), "ios" | "android") {
        panic!(
            "\n\nfeature `espeak` on {target_os} needs a cross-compiled libespeak-ng.\n\
             Set ESPEAK_LIB_DIR to the directory containing libespeak-ng.a.\n"
        );
    }

    if from_pkg_config(&target_os) {
        return;
    }

    let dirs = search_dirs(&target_os, &target_arch);
    if let Some(dir) = dirs.iter().find(|d| has_static(d)) {
        emit(dir, Kind::Static, &target_os);
        return;
    }
    let shared = if target_os == "macos" { "libespeak-ng.dylib" } else { "libespeak-ng.so" };
    if let Some(dir) = dirs.iter().find(|d| Path::new(d).join(shared).exists()) {
        emit(dir, Kind::Dynamic, &target_os);
        return;
    }

    panic!(
        "\n\nfeature `espeak`: libespeak-ng not found.\n\
         Install it (brew install espeak-ng / apt install libespeak-ng-dev /\n\
         dnf install espeak-ng-devel / apk add espeak-ng-dev) or set ESPEAK_LIB_DIR.\n"
    );
}

#[derive(Clone, Copy)]
enum Kind {
    Static,
    Dynamic,
}

fn has_static(dir: &str) -> bool {
    Path::new(dir).join("libespeak-ng.a").exists()
}

fn emit(dir: &str, kind: Kind, target_os: &str) {
    println!("cargo:rustc-link-search=native={dir}");
    match kind {
        Kind::Static => {
            println!("cargo:rustc-link-lib=static=espeak-ng");
            let cxx = if matches!(target_os, "macos" | "ios") { "c++" } else { "stdc++" };
            println!("cargo:rustc-link-lib=dylib={cxx}");
        }
        Kind::Dynamic => println!("cargo:rustc-link-lib=dylib=espeak-ng"),
    }
}

fn run(cmd: &str, args: &[&str], pkg_path: Option<&str>) -> Option<String> {
    let mut command = Command::new(cmd);
    command.args(args);
    if let Some(path) = pkg_path {
        command.env("PKG_CONFIG_PATH", path);
    }
    let out = command.output().ok()?;
    if !out.status.success() {
        return None;
    }
    String::from_utf8(out.stdout).ok().map(|s| s.trim().to_owned())
}

fn from_pkg_config(target_os: &str) -> bool {
    let mut paths = Vec::new();
    if target_os == "macos" {
        if let Some(keg) = run("brew", &["--prefix", "espeak-ng"], None) {
            paths.push(format!("{keg}/lib/pkgconfig"));
        }
        for prefix in ["/opt/homebrew", "/usr/local"] {
            paths.push(format!("{prefix}/lib/pkgconfig"));
            paths.push(format!("{prefix}/share/pkgconfig"));
        }
        paths.retain(|p| Path::new(p).is_dir());
    }
    if let Ok(existing) = env::var("PKG_CONFIG_PATH") {
        if !existing.is_empty() {
            paths.push(existing);
        }
    }
    let pkg_path = paths.join(":");

    let Some(libs) = run("pkg-config", &["--libs", "--static", "espeak-ng"], Some(&pkg_path))
        .or_else(|| run("pkg-config", &["--libs", "espeak-ng"], Some(&pkg_path)))
    else {
        return false;
    };

    for flag in libs.split_whitespace() {
        if let Some(dir) = flag.strip_prefix("-L") {
            println!("cargo:rustc-link-search=native={dir}");
        } else if let Some(lib) = flag.strip_prefix("-l") {
            println!("cargo:rustc-link-lib=dylib={lib}");
        }
    }
    if let Some(libdir) = run("pkg-config", &["--variable=libdir", "espeak-ng"], Some(&pkg_path)) {
        if !libdir.is_empty() {
            println!("cargo:rustc-link-search=native={libdir}");
        }
    }
    true
}

fn search_dirs(target_os: &str, target_arch: &str) -> Vec<String> {
    let mut dirs = Vec::new();
    if target_os == "macos" {
        if let Some(keg) = run("brew", &["--prefix", "espeak-ng"], None) {
            dirs.push(format!("{keg}/lib"));
        }
        for prefix in ["/opt/homebrew", "/usr/local"] {
            dirs.push(format!("{prefix}/opt/espeak-ng/lib"));
            dirs.push(format!("{prefix}/lib"));
        }
    } else {
        let multiarch = match target_arch {
            "x86_64" => Some("x86_64-linux-gnu"),
            "aarch64" => Some("aarch64-linux-gnu"),
            "arm" => Some("arm-linux-gnueabihf"),
            "riscv64" => Some("riscv64-linux-gnu"),
            _ => None,
        };
        if let Some(triple) = multiarch {
            dirs.push(format!("/usr/lib/{triple}"));
        }
        dirs.extend(["/usr/lib64", "/usr/lib", "/usr/local/lib"].map(String::from));
    }
    dirs.retain(|d| Path::new(d).is_dir());
    dirs
}
