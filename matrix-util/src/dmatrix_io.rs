use crate::common_io::{read_lines_of_types, write_lines, Delimiter};
use crate::traits::IoOps;
use nalgebra::DMatrix;

impl IoOps for DMatrix<f64> {
    type Scalar = f64;
    type Mat = Self;

    fn read_file_delim(
        file: &str,
        delim: impl Into<Delimiter>,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat> {
        let hdr_line = match skip {
            Some(skip) => skip as i64,
            None => -1,
        };

        let data = read_lines_of_types::<f64>(file, delim, hdr_line)?.lines;

        if data.is_empty() {
            return Err(anyhow::anyhow!("no data in {}", file));
        }

        let ncols = data[0].len();
        let nrows = data.len();

        if let Some(i) = data.iter().position(|row| row.len() != ncols) {
            return Err(anyhow::anyhow!(
                "{}: line {} has {} fields, expected {}",
                file,
                i + 1,
                data[i].len(),
                ncols
            ));
        }

        Ok(DMatrix::from_row_iterator(
            nrows,
            ncols,
            data.into_iter().flatten(),
        ))
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()> {
        // row order matters, so no parallel iterator here
        let lines = self
            .row_iter()
            .map(|row| {
                row.iter()
                    .map(|x| format!("{}", x))
                    .collect::<Vec<_>>()
                    .join(delim)
                    .into_boxed_str()
            })
            .collect::<Vec<_>>();
        write_lines(&lines, file)
    }
}
