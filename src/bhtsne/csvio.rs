//! csv helpers to feed bh_tsne from a file and dump embeddings for plotting

use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array2, ArrayView};

use super::error::{TsneError, TsneResult};

/// Loads a matrix of f64 from a csv file, one record per row.
/// All records must have the same number of fields.
pub fn load_matrix_csv(path: &Path, has_header: bool) -> TsneResult<Array2<f64>> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| TsneError::io(format!("opening {}", path.display()), e))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));
    //
    let mut data: Option<Array2<f64>> = None;
    for (num_record, result) in rdr.records().enumerate() {
        let record = result?;
        let row = record
            .iter()
            .map(|field| {
                field.parse::<f64>().map_err(|_| {
                    TsneError::InvalidParameter(format!(
                        "record {} : cannot decode field {:?}",
                        num_record, field
                    ))
                })
            })
            .collect::<TsneResult<Vec<f64>>>()?;
        let data = data.get_or_insert_with(|| Array2::<f64>::zeros((0, row.len())));
        data.push_row(ArrayView::from(&row)).map_err(|_| {
            TsneError::InvalidParameter(format!(
                "record {} has {} fields, expected {}",
                num_record,
                row.len(),
                data.ncols()
            ))
        })?;
    }
    let data = data.ok_or_else(|| TsneError::InvalidParameter(format!("no record in {}", path.display())))?;
    log::info!("load_matrix_csv : loaded {:?} from {}", data.dim(), path.display());
    Ok(data)
} // end of load_matrix_csv

/// Writes embedding in a csv file, one row per line, without header
pub fn dump_embedding_csv(path: &Path, embedding: &Array2<f64>) -> TsneResult<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| TsneError::io(format!("creating {}", path.display()), e))?;
    let mut wtr = csv::Writer::from_writer(BufWriter::new(file));
    for row in embedding.rows() {
        wtr.write_record(row.iter().map(|x| x.to_string()))?;
    }
    wtr.flush()
        .map_err(|e| TsneError::io(format!("flushing {}", path.display()), e))?;
    log::debug!("dumped embedding {:?} in {}", embedding.dim(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {

    use super::*;

    use ndarray::array;

    #[test]
    fn csv_load_and_dump() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.csv");
        std::fs::write(&input, "x,y,z\n1.0, 2.0, 3.5\n-4,5e-1,6\n").unwrap();
        let data = load_matrix_csv(&input, true).unwrap();
        assert_eq!(data, array![[1.0, 2.0, 3.5], [-4., 0.5, 6.]]);
        //
        let output = dir.path().join("embedding.csv");
        dump_embedding_csv(&output, &data).unwrap();
        let reloaded = load_matrix_csv(&output, false).unwrap();
        assert_eq!(reloaded, data);
    }

    #[test]
    fn csv_bad_records() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.csv");
        std::fs::write(&input, "1,2\n3,abc\n").unwrap();
        assert!(matches!(load_matrix_csv(&input, false), Err(TsneError::InvalidParameter(_))));
        // ragged rows are rejected by csv reader itself
        std::fs::write(&input, "1,2\n3,4,5\n").unwrap();
        assert!(load_matrix_csv(&input, false).is_err());
        std::fs::write(&input, "").unwrap();
        assert!(load_matrix_csv(&input, false).is_err());
    }
} // end of mod tests
