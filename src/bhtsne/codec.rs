//! Binary files exchanged with bh_tsne.
//!
//! All integers are 4 bytes signed, all floats 8 bytes, little endian, no padding.
//!
//! Input file (*data.dat*) :
//! ```text
//! offset      field        type
//! 0           n            i32
//! 4           d            i32
//! 8           theta        f64
//! 16          perplexity   f64
//! 24          map_dims     i32
//! 28          max_iter     i32
//! 32          data         n*d f64, row major
//! 32+n*d*8    map_dims     i32, only if a seed was asked for
//! ```
//!
//! Result file (*result.dat*) :
//! ```text
//! 0           n            i32
//! 4           md           i32
//! 8           data         n*md f64, row major
//! ```

use std::fs::OpenOptions;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use num_traits::float::Float;

use super::error::{TsneError, TsneResult};
use super::params::{RunParameters, TsneConfig};

/// size of input file header
pub const INPUT_HEADER_SIZE: usize = 32;
/// size of result file header
pub const RESULT_HEADER_SIZE: usize = 8;

/// exact length of encoded input for a (n,d) matrix
pub fn encoded_len(n: usize, d: usize, with_seed: bool) -> usize {
    INPUT_HEADER_SIZE + n * d * 8 + if with_seed { 4 } else { 0 }
}

fn to_i32(value: usize, what: &str) -> TsneResult<i32> {
    i32::try_from(value)
        .map_err(|_| TsneError::InvalidParameter(format!("{} = {} does not fit in i32", what, value)))
}

/// serialize matrix and parameters in bh_tsne input format.
/// Values are converted to f64 and written in logical row major order whatever the memory layout of matrix.
pub fn write_input<T, W>(writer: &mut W, matrix: &ArrayView2<T>, params: &RunParameters) -> TsneResult<()>
where
    T: Float,
    W: Write,
{
    params.check()?;
    let (n, d) = matrix.dim();
    if n == 0 || d == 0 {
        return Err(TsneError::InvalidParameter(format!(
            "matrix must have at least one row and one column, got shape ({},{})",
            n, d
        )));
    }
    let n_i = to_i32(n, "n")?;
    let d_i = to_i32(d, "d")?;
    let map_dims = to_i32(params.map_dims, "map_dims")?;
    let max_iter = to_i32(params.max_iter, "max_iter")?;
    //
    let werr = |e: std::io::Error| TsneError::io("writing bh_tsne input", e);
    writer.write_all(&n_i.to_le_bytes()).map_err(werr)?;
    writer.write_all(&d_i.to_le_bytes()).map_err(werr)?;
    writer.write_all(&params.theta.to_le_bytes()).map_err(werr)?;
    writer.write_all(&params.perplexity.to_le_bytes()).map_err(werr)?;
    writer.write_all(&map_dims.to_le_bytes()).map_err(werr)?;
    writer.write_all(&max_iter.to_le_bytes()).map_err(werr)?;
    // iter() follows logical order, so a transposed view is written correctly
    for x in matrix.iter() {
        let x = x
            .to_f64()
            .ok_or_else(|| TsneError::InvalidParameter(String::from("matrix value not convertible to f64")))?;
        writer.write_all(&x.to_le_bytes()).map_err(werr)?;
    }
    // bh_tsne data format has a trailing random seed. We reproduce the marker written by
    // historical wrappers: map_dims again, not the seed value.
    if params.seed.is_some() {
        writer.write_all(&map_dims.to_le_bytes()).map_err(werr)?;
    }
    writer.flush().map_err(werr)?;
    Ok(())
} // end of write_input

/// Writes the bh_tsne input file in directory dir. Returns the path of the file written.
pub fn encode_input<T>(
    matrix: &ArrayView2<T>,
    params: &RunParameters,
    dir: &Path,
    config: &TsneConfig,
) -> TsneResult<PathBuf>
where
    T: Float,
{
    let path = dir.join(&config.data_file);
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .map_err(|e| TsneError::io(format!("creating {}", path.display()), e))?;
    let mut writer = BufWriter::new(file);
    write_input(&mut writer, matrix, params)?;
    log::debug!(
        "encode_input wrote {} bytes in {}",
        encoded_len(matrix.nrows(), matrix.ncols(), params.seed.is_some()),
        path.display()
    );
    Ok(path)
} // end of encode_input

/// decode content of a bh_tsne result file
pub fn parse_result(bytes: &[u8]) -> TsneResult<Array2<f64>> {
    if bytes.len() < RESULT_HEADER_SIZE {
        return Err(TsneError::Format(format!(
            "result file has {} bytes, less than its header size",
            bytes.len()
        )));
    }
    let n = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let md = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if n < 0 || md < 0 {
        return Err(TsneError::Format(format!("negative dimension in header n : {}, md : {}", n, md)));
    }
    let (n, md) = (n as usize, md as usize);
    let data = &bytes[RESULT_HEADER_SIZE..];
    let expected = n
        .checked_mul(md)
        .and_then(|nb| nb.checked_mul(8))
        .ok_or_else(|| TsneError::Format(format!("header overflow n : {}, md : {}", n, md)))?;
    if data.len() != expected {
        return Err(TsneError::Format(format!(
            "header announces ({},{}) i.e {} bytes of data, got {}",
            n,
            md,
            expected,
            data.len()
        )));
    }
    let values: Vec<f64> = data
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect();
    Array2::from_shape_vec((n, md), values).map_err(|e| TsneError::Format(e.to_string()))
} // end of parse_result

/// reads the bh_tsne result file in directory dir
pub fn decode_result(dir: &Path, config: &TsneConfig) -> TsneResult<Array2<f64>> {
    let path = dir.join(&config.result_file);
    let mut file = OpenOptions::new()
        .read(true)
        .open(&path)
        .map_err(|e| TsneError::io(format!("opening {}", path.display()), e))?;
    let mut bytes = Vec::<u8>::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| TsneError::io(format!("reading {}", path.display()), e))?;
    log::debug!("decode_result read {} bytes from {}", bytes.len(), path.display());
    parse_result(&bytes)
}

//========================================

// end of mod tests
