use std::fs::File;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use upkg::bytecode::ScriptFormat;
use upkg::flags::{describe, OBJECT_FLAG_NAMES, PACKAGE_FLAG_NAMES};
use upkg::schema::{skip_state_frame, ClassLoader, DirectorySource};
use upkg::{ObjectRef, Package, PackageOptions, PropertyCodec};

#[derive(Parser)]
#[command(name = "upkg", version, about = "Inspect Unreal Engine 2 packages")]
struct Cli {
    /// Opcode table revision of the scripts: legacy or extended
    #[arg(long, global = true, default_value = "extended")]
    script_format: ScriptFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show header fields, GUID and generations
    Info {
        input: PathBuf,
    },
    /// List the name table
    Names {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List the import table with full names
    Imports {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List the export table with full names
    Exports {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Write the raw payload of one export
    Extract {
        input:  PathBuf,
        /// Export full name, with or without the package prefix
        export: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Hex dump to stdout instead of raw bytes
        #[arg(long)]
        hex: bool,
    },
    /// Decode the property list of an export
    Props {
        input:  PathBuf,
        export: String,
        /// Directory holding the script packages (Core.u, Engine.u, ...)
        #[arg(short, long)]
        classpath: PathBuf,
    },
    /// Render the bytecode of a function, state or class
    Disasm {
        /// Full name, e.g. Engine.Actor.Touch
        function: String,
        #[arg(short, long)]
        classpath: PathBuf,
    },
}

#[derive(Serialize)]
struct ImportRow {
    index:     usize,
    reference: ObjectRef,
    class:     String,
    full_name: String,
}

#[derive(Serialize)]
struct ExportRow {
    index:     usize,
    reference: ObjectRef,
    class:     String,
    full_name: String,
    flags:     u32,
    size:      i32,
    offset:    i32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let options = PackageOptions { script_format: cli.script_format, ..PackageOptions::default() };

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let pkg = Package::open_with(&input, options)?;
            let h = pkg.header();
            println!("── Unreal package ───────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Name           {}", pkg.name());
            println!("  Version        {} (licensee {})", h.version, h.licensee);
            println!("  Flags          {:#010x} {}", h.package_flags, describe(h.package_flags, PACKAGE_FLAG_NAMES).join(" "));
            println!("  GUID           {}", h.guid);
            println!("  Names          {:>6} @ {:#x}", h.name_count, h.name_offset);
            println!("  Imports        {:>6} @ {:#x}", h.import_count, h.import_offset);
            println!("  Exports        {:>6} @ {:#x}", h.export_count, h.export_offset);
            match pkg.data_end_offset() {
                Ok(end) => println!("  Data block     {:#x}..{:#x}", pkg.data_start_offset()?, end),
                Err(_)  => println!("  Data block     (empty)"),
            }
            println!("  Generations ({}):", h.generations.len());
            for g in &h.generations {
                println!("    exports={:<6} names={}", g.export_count, g.name_count);
            }
        }

        // ── Tables ───────────────────────────────────────────────────────────
        Commands::Names { input, json } => {
            let pkg = Package::open_with(&input, options)?;
            let names = pkg.tables().names();
            if json {
                println!("{}", serde_json::to_string_pretty(names)?);
            } else {
                for (i, n) in names.iter().enumerate() {
                    println!("{:>6}  {:<40} {}", i, n.name, describe(n.flags, OBJECT_FLAG_NAMES).join(" "));
                }
            }
        }

        Commands::Imports { input, json } => {
            let pkg = Package::open_with(&input, options)?;
            let t = pkg.tables();
            let rows = (0..t.imports().len())
                .map(|i| {
                    Ok(ImportRow {
                        index:     i,
                        reference: ObjectRef::from_import(i),
                        class:     t.import_class_full_name(i)?,
                        full_name: t.import_full_name(i)?,
                    })
                })
                .collect::<upkg::Result<Vec<_>>>()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for r in rows {
                    println!("{:>6}  {:<24} {}", r.reference, r.class, r.full_name);
                }
            }
        }

        Commands::Exports { input, json } => {
            let pkg = Package::open_with(&input, options)?;
            let t = pkg.tables();
            let rows = t
                .exports()
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    let reference = ObjectRef::from_export(i);
                    Ok(ExportRow {
                        index:     i,
                        reference,
                        class:     t.object_class_name(reference)?,
                        full_name: t.export_full_name(i)?,
                        flags:     e.flags,
                        size:      e.size,
                        offset:    e.offset,
                    })
                })
                .collect::<upkg::Result<Vec<_>>>()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{:>6}  {:<20} {:>8} {:>10}  Name", "Ref", "Class", "Size", "Offset");
                for r in rows {
                    println!("{:>6}  {:<20} {:>8} {:>#10x}  {}", r.reference, r.class, r.size, r.offset, r.full_name);
                }
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, export, output, hex } => {
            let mut pkg = Package::open_with(&input, options)?;
            let index = find_export(&pkg, &export)?;
            let data = pkg.export_data(index)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &data)?;
                    println!("Wrote {} bytes to {}", data.len(), path.display());
                }
                None if hex => {
                    for (i, line) in data.chunks(16).enumerate() {
                        println!("{:08x}  {}", i * 16, hex::encode(line));
                    }
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&data)?;
                }
            }
        }

        // ── Props ────────────────────────────────────────────────────────────
        Commands::Props { input, export, classpath } => {
            let mut pkg = Package::open_with(&input, options)?;
            let index = find_export(&pkg, &export)?;
            let data = pkg.export_data(index)?;
            let loader = class_loader(&classpath, options);

            let tables = pkg.tables();
            let reference = ObjectRef::from_export(index);
            let mut payload = data.as_slice();
            if tables.export(index)?.flags & upkg::flags::object::HAS_STACK != 0 {
                skip_state_frame(&mut payload)?;
            }
            let scope = tables.object_class_full_name(reference)?;
            let props = PropertyCodec::new(tables, &loader)
                .with_encoding(options.encoding)
                .read_properties(&mut payload, &scope)?;
            println!("{}", serde_json::to_string_pretty(&props)?);
        }

        // ── Disasm ───────────────────────────────────────────────────────────
        Commands::Disasm { function, classpath } => {
            let loader = class_loader(&classpath, options);
            for line in loader.disassemble(&function)? {
                println!("{line}");
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn find_export(pkg: &Package<File>, name: &str) -> Result<usize, Box<dyn std::error::Error>> {
    pkg.tables()
        .find_export(name)
        .ok_or_else(|| format!("no export named '{name}' in {}", pkg.name()).into())
}

fn class_loader(classpath: &Path, options: PackageOptions) -> ClassLoader<DirectorySource> {
    ClassLoader::new(DirectorySource::new(classpath).with_options(options))
}
