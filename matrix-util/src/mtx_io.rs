use crate::common_io::*;
use std::io::Write;

/// `(row, column, value)` with 0-based indices
pub type Triplet = (usize, usize, f64);

/// Write the triplets into a MatrixMarket file with 1-based indices
/// * `triplets` - the triplets to write
/// * `nrow` - number of rows
/// * `ncol` - number of columns
/// * `mtx_file` - the output file (e.g., "matrix.mtx.gz")
pub fn write_mtx_triplets(
    triplets: &[Triplet],
    nrow: usize,
    ncol: usize,
    mtx_file: &str,
) -> anyhow::Result<()> {
    let mut buf = open_buf_writer(mtx_file)?;

    writeln!(buf, "%%MatrixMarket matrix coordinate real general")?;
    writeln!(buf, "{}\t{}\t{}", nrow, ncol, triplets.len())?;

    for (row, col, val) in triplets {
        writeln!(buf, "{}\t{}\t{}", row + 1, col + 1, val)?;
    }

    buf.flush()?;
    Ok(())
}

/// Read a MatrixMarket coordinate file
/// * `mtx_file` - path to the file, gzipped or not
///
/// Returns the 0-based triplets sorted by (row, column) and the
/// `(nrow, ncol, nnz)` header
pub fn read_mtx_triplets(mtx_file: &str) -> anyhow::Result<(Vec<Triplet>, (usize, usize, usize))> {
    let ReadLinesOut { lines, header } = read_lines_of_words(mtx_file, 0)?;

    if header.len() != 3 {
        return Err(anyhow::anyhow!("failed to parse mtx header in {}", mtx_file));
    }
    let nrow = header[0].parse::<usize>()?;
    let ncol = header[1].parse::<usize>()?;
    let nnz = header[2].parse::<usize>()?;

    let mut triplets = Vec::with_capacity(nnz);
    for (i, words) in lines.iter().enumerate() {
        if words.len() != 3 {
            return Err(anyhow::anyhow!(
                "{}: entry {} has {} fields",
                mtx_file,
                i + 1,
                words.len()
            ));
        }
        let row = words[0].parse::<usize>()?;
        let col = words[1].parse::<usize>()?;
        let val = words[2].parse::<f64>()?;
        if row == 0 || col == 0 || row > nrow || col > ncol {
            return Err(anyhow::anyhow!(
                "{}: entry ({}, {}) outside {} x {}",
                mtx_file,
                row,
                col,
                nrow,
                ncol
            ));
        }
        triplets.push((row - 1, col - 1, val));
    }

    if triplets.len() != nnz {
        log::warn!(
            "{}: header says {} entries, found {}",
            mtx_file,
            nnz,
            triplets.len()
        );
    }

    triplets.sort_by_key(|&(row, col, _)| (row, col));
    Ok((triplets, (nrow, ncol, nnz)))
}
