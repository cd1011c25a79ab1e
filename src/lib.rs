//! Driver for the Barnes-Hut t-SNE executable of L. van der Maaten
//! (see [bhtsne](https://github.com/lvdmaaten/bhtsne)).
//!
//! bh_tsne reads its input from a file *data.dat* and writes its embedding in a file *result.dat*, both
//! in the directory it is run from. This crate encodes an [ndarray](https://crates.io/crates/ndarray) matrix
//! in that binary format, runs the executable in an isolated directory and decodes the result.
//! It can also run the executable several times and keep the embedding with the lowest reported KL error.

use lazy_static::lazy_static;

lazy_static! {
    static ref LOG: u64 = init_log();
}

// install a logger facility
fn init_log() -> u64 {
    let _res = env_logger::try_init();
    log::debug!("logger initialized");
    1
}

/// forces logger installation. Called by runners at construction so that a client
/// not installing its own logger still gets RUST_LOG driven output.
pub(crate) fn ensure_log() {
    lazy_static::initialize(&LOG);
}

pub mod bhtsne;

pub use bhtsne::{decode_result, encode_input, ensure_executable, run_best, run_once};
