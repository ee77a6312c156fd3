//! Chipstore inspection utility
//!
//! Read-only views of container files: object listings, headers, table
//! dumps and store counters.

use anyhow::{bail, Context, Result};
use chipstore::{Group, ObjectKind, OpenFlags, StoreFile, Table};
use clap::{Parser, Subcommand};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "chipstore-util")]
#[command(about = "Inspect chipstore container files")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List objects recursively with kinds, types and lengths
    Ls {
        file: PathBuf,
        /// Group to start from (default: root)
        group: Option<String>,
    },
    /// Print the header pairs of a group
    Headers { file: PathBuf, group: Option<String> },
    /// Print a table as tab-separated lines
    Dump {
        file: PathBuf,
        /// Table path, e.g. `results/probesets`
        table: String,
    },
    /// Print the first line of a table whose column matches a value
    Find {
        file: PathBuf,
        table: String,
        level: usize,
        column: String,
        value: String,
    },
    /// Print page and object counters
    Stats { file: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match args.command {
        Command::Ls { file, group } => {
            let mut store = open(&file)?;
            let group = container(&mut store, group.as_deref())?;
            list(group, 0, &mut out)?;
        }
        Command::Headers { file, group } => {
            let mut store = open(&file)?;
            let group = container(&mut store, group.as_deref())?;
            for (key, value) in group.headers() {
                writeln!(out, "{}={}", key, value)?;
            }
        }
        Command::Dump { file, table } => {
            let mut store = open(&file)?;
            let table = open_table(&mut store, &table)?;
            dump(table, &mut out)?;
        }
        Command::Find {
            file,
            table,
            level,
            column,
            value,
        } => {
            let mut store = open(&file)?;
            let table = open_table(&mut store, &table)?;
            table.rewind();
            if !table.find_first(level, column.as_str(), &value)? {
                bail!("no line at level {} has {} = {}", level, column, value);
            }
            let line = table.line_num().unwrap_or_default();
            write!(out, "{}", line)?;
            write_row(table, level, &mut out)?;
        }
        Command::Stats { file } => {
            let store = open(&file)?;
            let stats = store.stats();
            writeln!(out, "objects\t{}", stats.objects)?;
            writeln!(out, "total_pages\t{}", stats.total_pages)?;
            writeln!(out, "free_pages\t{}", stats.free_pages)?;
            writeln!(out, "file_bytes\t{}", stats.file_bytes)?;
        }
    }

    out.flush()?;
    Ok(())
}

fn open(path: &Path) -> Result<StoreFile> {
    if !StoreFile::is_store_file(path) {
        bail!("{} is not a chipstore file", path.display());
    }
    debug!("Opening {:?}", path);
    StoreFile::open(path, OpenFlags::OPEN | OpenFlags::READONLY)
        .with_context(|| format!("failed to open {}", path.display()))
}

fn container<'a>(file: &'a mut StoreFile, group: Option<&str>) -> Result<&'a mut Group> {
    match group.map(|g| g.trim_matches('/')).filter(|g| !g.is_empty()) {
        Some(path) => file
            .open_group(path, OpenFlags::OPEN)
            .with_context(|| format!("no group '{}'", path)),
        None => Ok(file.root_mut()),
    }
}

fn open_table<'a>(file: &'a mut StoreFile, path: &str) -> Result<&'a mut Table> {
    let path = path.trim_matches('/');
    let (group, name) = match path.rsplit_once('/') {
        Some((group, name)) => (Some(group), name),
        None => (None, path),
    };
    container(file, group)?
        .open_table(name, OpenFlags::OPEN)
        .with_context(|| format!("no table '{}'", path))
}

fn list(group: &mut Group, depth: usize, out: &mut impl Write) -> Result<()> {
    let indent = "  ".repeat(depth);
    for name in group.list_names() {
        match group.kind_of(&name) {
            Some(ObjectKind::Vector) => {
                let vector = group.open_vector(&name, None, OpenFlags::OPEN)?;
                writeln!(out, "{}{}\tvector\t{}\t{}", indent, name, vector.dtype(), vector.size())?;
            }
            Some(ObjectKind::Table) => {
                let table = group.open_table(&name, OpenFlags::OPEN)?;
                writeln!(
                    out,
                    "{}{}\ttable\t{} levels\t{} lines",
                    indent,
                    name,
                    table.level_count(),
                    table.line_count()
                )?;
                for level in 0..table.level_count() {
                    for column in table.columns(level) {
                        writeln!(
                            out,
                            "{}  [{}:{}] {}\t{}\t{}",
                            indent,
                            level,
                            column.index(),
                            column.name(),
                            column.dtype(),
                            column.rows()
                        )?;
                    }
                }
            }
            Some(ObjectKind::Group) => {
                writeln!(out, "{}{}/\tgroup", indent, name)?;
                list(group.open_group(&name, OpenFlags::OPEN)?, depth + 1, out)?;
            }
            None => {}
        }
    }
    Ok(())
}

fn dump(table: &mut Table, out: &mut impl Write) -> Result<()> {
    for level in 0..table.level_count() {
        let names: Vec<&str> = table.columns(level).map(|c| c.name()).collect();
        writeln!(out, "#level{}\t{}", level, names.join("\t"))?;
    }

    table.rewind();
    while table.next_line()? {
        let level = table.line_level()?;
        write!(out, "{}", level)?;
        write_row(table, level, out)?;
    }
    Ok(())
}

/// Write the current line's values at `level`, tab-prefixed, then a newline
fn write_row(table: &mut Table, level: usize, out: &mut impl Write) -> Result<()> {
    let indices: Vec<usize> = table.columns(level).map(|c| c.index()).collect();
    for index in indices {
        write!(out, "\t{}", table.get_as_string(level, index)?)?;
    }
    writeln!(out)?;
    Ok(())
}
