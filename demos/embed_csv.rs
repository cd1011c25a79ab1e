//! Embeds the rows of a csv file with bh_tsne, keeping the best of several runs.
//!
//! ```text
//! cargo run --release --example embed_csv -- --input data.csv --output embedding.csv --trials 10
//! ```
//!
//! bh_tsne is searched in PATH, the current directory and $HOME/.bhtsne. If it is not found it is cloned
//! from <https://github.com/lvdmaaten/bhtsne> and compiled with g++.
//! The environment variables BHTSNE_EXE, BHTSNE_TOOL_DIR and BHTSNE_WORK_ROOT amend this.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;

use cpu_time::ProcessTime;
use std::time::SystemTime;

use tsnedriver::bhtsne::csvio::{dump_embedding_csv, load_matrix_csv};
use tsnedriver::bhtsne::*;

#[derive(Parser, Debug)]
#[command(name = "embed_csv")]
#[command(about = "t-SNE embedding of a csv file through bh_tsne")]
struct Args {
    /// csv file, one point per record
    #[arg(short, long)]
    input: PathBuf,

    /// csv file receiving the embedding
    #[arg(short, long)]
    output: PathBuf,

    /// input file has a header line
    #[arg(long, default_value_t = false)]
    header: bool,

    /// number of bh_tsne runs, the embedding with lowest error is kept
    #[arg(short, long, default_value_t = 1)]
    trials: usize,

    #[arg(long, default_value_t = 0.5)]
    theta: f64,

    #[arg(long, default_value_t = 30.)]
    perplexity: f64,

    #[arg(long, default_value_t = 2)]
    dims: usize,

    #[arg(long, default_value_t = 1000)]
    max_iter: usize,

    /// kill a bh_tsne run after this number of seconds
    #[arg(long)]
    timeout: Option<u64>,
}

pub fn main() -> anyhow::Result<()> {
    let _ = env_logger::builder().try_init();
    let args = Args::parse();
    //
    let data = load_matrix_csv(&args.input, args.header)?;
    let params = RunParameters::new(args.theta, args.perplexity, args.dims, args.max_iter);
    let mut config = TsneConfig::from_env();
    if let Some(secs) = args.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    let exe = ensure_executable(&config)?;
    log::info!("using {}", exe.display());
    //
    let cpu_start = ProcessTime::now();
    let sys_now = SystemTime::now();
    let embedding = if args.trials <= 1 {
        run_once(&data.view(), &params, &config)?
    } else {
        let best = run_best(&data.view(), &params, args.trials, &config)?
            .ok_or_else(|| anyhow!("none of the {} bh_tsne runs reported an error", args.trials))?;
        println!("lowest error : {:.6}", best.error);
        best.embedding
    };
    println!(
        "embedding total sys time(s) {:.2e}  cpu time {:.2e}",
        sys_now.elapsed()?.as_secs_f64(),
        cpu_start.elapsed().as_secs_f64()
    );
    dump_embedding_csv(&args.output, &embedding)?;
    println!("embedding {:?} written in {}", embedding.dim(), args.output.display());
    Ok(())
}
