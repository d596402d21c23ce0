use crate::error::{Error, Result};
use crate::tensor::data::DataType;
use crate::tensor::Tensor;
use itertools::Itertools;
use num_traits::ToPrimitive;
use std::fmt::Write;

impl<D: DataType> Tensor<'_, D> {
    /// Renders a float32 tensor as nested rows, one innermost row per line.
    pub fn format_f32(&self) -> Result<String> {
        if !self.data_type().is_float32() {
            return Err(Error::unsupported(format!(
                "formatting {} tensors (only float32 supported)",
                self.data_type()
            )));
        }

        let dims = self
            .dims()
            .iter()
            .map(|d| d.to_usize())
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| Error::invalid("negative dimension"))?;

        let needed = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| Error::invalid("tensor shape overflows"))?;

        let values = self.to_vec::<f32>()?;
        if values.len() < needed {
            return Err(Error::invalid(format!(
                "tensor holds {} values but its shape needs {}",
                values.len(),
                needed
            )));
        }

        let mut out = String::new();
        let _ = writeln!(out, "Tensor shape: [{}]", dims.iter().join(", "));
        out.push_str("Values:\n");
        write_rows(&mut out, &values, &dims, 0);
        Ok(out)
    }
}

fn write_rows(out: &mut String, data: &[f32], dims: &[usize], level: usize) {
    match dims {
        [] => {}
        [n] => {
            let _ = writeln!(
                out,
                "{}[{}]",
                "  ".repeat(level + 1),
                data[..*n].iter().map(|v| format!("{:.4}", v)).join(", ")
            );
        }
        [n, rest @ ..] => {
            let sub = rest.iter().product::<usize>();
            for i in 0..*n {
                write_rows(out, &data[i * sub..(i + 1) * sub], rest, level + 1);
            }
        }
    }
}
