use std::fs::{self, File};
use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::*;
use log::*;
use memmap2::Mmap;
use rayon::prelude::*;
use structopt::*;

use zipcore::driver::{self, EncryptedEntryPolicy, ExtractOptions};
use zipcore::read::*;
use zipcore::selector::EntrySelector;
use zipcore::sink::{FileSink, InputPrompt, OverwritePolicy, PipeSink, Sink};

#[derive(Debug, StructOpt)]
#[structopt(name = "unzip", about = "Lists, tests, or extracts a .zip file")]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    /// Lists the archive's contents instead of extracting them.
    #[structopt(short = "l", long)]
    list: bool,

    /// Tests the archive: decompresses and checks the CRC-32 of every
    /// selected entry without writing anything out.
    #[structopt(short = "t", long)]
    test: bool,

    /// Extracts each file's contents to stdout, concatenated, instead of
    /// to the filesystem.
    #[structopt(short = "p", long)]
    pipe: bool,

    /// Extracts into the given directory instead of the current one.
    #[structopt(short = "d", long)]
    directory: Option<PathBuf>,

    /// Overwrites existing files without prompting.
    #[structopt(short = "o", long)]
    overwrite: bool,

    /// Never overwrites existing files.
    #[structopt(short = "n", long)]
    never_overwrite: bool,

    /// Password for traditionally-encrypted (ZipCrypto) entries.
    #[structopt(short = "P", long)]
    password: Option<String>,

    /// Include only entries matching this glob (may be given multiple
    /// times). Without any, every entry is selected.
    #[structopt(short = "i", long = "include")]
    include: Vec<String>,

    /// Exclude entries matching this glob (may be given multiple times;
    /// applied after `--include`).
    #[structopt(short = "x", long = "exclude")]
    exclude: Vec<String>,

    #[structopt(name("ZIP file"))]
    zip_path: PathBuf,
}

/// Prompts on stdin, the way `unzip` itself does when it hits an
/// existing file and wasn't told `-o`/`-n` up front.
struct StdinPrompt;

impl InputPrompt for StdinPrompt {
    fn confirm_overwrite(&mut self, path: &camino::Utf8Path) -> bool {
        eprint!("replace {}? [y]es, [n]o: ", path);
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().chars().next(), Some('y') | Some('Y'))
    }
}

fn main() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    errlog.init()?;

    info!("Memory mapping {:#?}", &args.zip_path);
    let zip_file = File::open(&args.zip_path).context("Couldn't open zip file")?;
    let mapping = unsafe { Mmap::map(&zip_file).context("Couldn't mmap zip file")? };

    let archive = ZipArchive::with_prepended_data(&mapping).context("Couldn't load archive")?.0;

    let mut selector = EntrySelector::new();
    for pattern in &args.include {
        selector = selector.include(pattern, false);
    }
    for pattern in &args.exclude {
        selector = selector.exclude(pattern, false);
    }

    let options = ExtractOptions {
        selector,
        password: args.password.map(String::into_bytes),
        encrypted_entry_policy: EncryptedEntryPolicy::Skip,
        stop_on_first_error: false,
    };

    if args.list {
        return list(&archive, &options);
    }

    if args.test {
        return test(&archive, &options);
    }

    if args.pipe {
        let mut sink = PipeSink::new(io::stdout().lock());
        return run_extract(&archive, &options, &mut sink);
    }

    let root = args.directory.unwrap_or_else(|| PathBuf::from("."));
    let overwrite = match (args.overwrite, args.never_overwrite) {
        (true, true) => bail!("-o and -n are mutually exclusive"),
        (true, false) => OverwritePolicy::Always,
        (false, true) => OverwritePolicy::Never,
        (false, false) => OverwritePolicy::Prompt,
    };

    // Each entry is compressed independently, so extraction to real files
    // can run on multiple threads at once -- so long as nothing needs to
    // prompt on stdin, which is inherently one question at a time.
    if overwrite != OverwritePolicy::Prompt {
        return run_extract_parallel(&archive, &options, &root, overwrite);
    }

    let mut prompt = StdinPrompt;
    let mut sink = FileSink::new(root, overwrite, &mut prompt);
    run_extract(&archive, &options, &mut sink)
}

fn list(archive: &ZipArchive, options: &ExtractOptions) -> Result<()> {
    if let Some(label) = driver::volume_label(archive) {
        println!(" Volume: {}", label.path);
    }
    let entries = driver::select(archive, options)?;
    println!("{:>12}  {:<10}  Name", "Length", "Modified");
    let mut total = 0usize;
    for entry in &entries {
        let modified = entry
            .last_modified
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("{:>12}  {:<10}  {}", entry.size, modified, entry.path);
        total += entry.size;
    }
    println!("{:>12}  {:<10}  {} files", total, "", entries.len());
    Ok(())
}

fn test(archive: &ZipArchive, options: &ExtractOptions) -> Result<()> {
    let outcomes = driver::test(archive, options, None)?;
    let mut failures = 0;
    for outcome in &outcomes {
        match &outcome.result {
            std::result::Result::Ok(()) => println!("    OK   {}", outcome.path),
            Err(e) => {
                failures += 1;
                println!("  FAILED  {}: {}", outcome.path, e);
            }
        }
    }
    if failures > 0 {
        bail!("{} of {} entries failed testing", failures, outcomes.len());
    }
    println!("No errors detected in {} entries", outcomes.len());
    Ok(())
}

fn run_extract(archive: &ZipArchive, options: &ExtractOptions, sink: &mut dyn Sink) -> Result<()> {
    let outcomes = driver::extract(archive, options, sink, None)?;
    let mut failures = 0;
    for outcome in &outcomes {
        match &outcome.result {
            std::result::Result::Ok(()) => debug!("extracted {}", outcome.path),
            Err(e) => {
                failures += 1;
                error!("{}: {}", outcome.path, e);
            }
        }
    }
    if failures > 0 {
        bail!("{} of {} entries failed to extract", failures, outcomes.len());
    }
    Ok(())
}

/// Extracts to real files, reading and writing every selected entry
/// concurrently instead of one at a time. Used whenever the overwrite
/// policy is decided up front (`-o`/`-n`), since there's then no shared
/// state (a stdin prompt) for multiple threads to contend over.
fn run_extract_parallel(archive: &ZipArchive, options: &ExtractOptions, root: &PathBuf, overwrite: OverwritePolicy) -> Result<()> {
    let entries = driver::select(archive, options)?;
    let results: Vec<Result<()>> = entries
        .par_iter()
        .map(|entry| -> Result<()> {
            let dest = root.join(entry.path.as_std_path());
            if entry.is_dir() {
                fs::create_dir_all(&dest).with_context(|| format!("Couldn't create directory {}", entry.path))?;
                return Ok(());
            }
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).with_context(|| format!("Couldn't create directory {}", parent.display()))?;
            }
            if overwrite == OverwritePolicy::Never && dest.exists() {
                return Ok(());
            }
            if entry.encrypted && options.password.is_none() {
                bail!("{}: encrypted, no password given", entry.path);
            }
            let data = archive.read_to_vec(entry, options.password.as_deref())?;
            fs::write(&dest, &data).with_context(|| format!("Couldn't write {}", entry.path))?;
            Ok(())
        })
        .collect();

    let failures = results.iter().filter(|r| r.is_err()).count();
    for result in &results {
        if let Err(e) = result {
            error!("{}", e);
        }
    }
    if failures > 0 {
        bail!("{} of {} entries failed to extract", failures, entries.len());
    }
    Ok(())
}
