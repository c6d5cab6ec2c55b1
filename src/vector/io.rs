//! Textual dumps of vector contents.

use std::io::Write;

use crate::algs::communicator::Communicator;
use crate::scalar::Scalar;
use crate::vector::Vector;
use crate::vector_error::VectorError;

impl<T: Scalar, C: Communicator> Vector<T, C> {
    /// Write this rank's owned entries, one `index<TAB>value` line each.
    /// Not collective.
    pub fn print_local<W: Write>(&self, out: &mut W) -> Result<(), VectorError> {
        let first = self.first_local_index();
        let owned = self.closed_operand()?.with_owned(|o| o.to_vec())?;
        writeln!(
            out,
            "Size\tglobal =  {}\t\tlocal =  {}",
            self.size(),
            owned.len()
        )?;
        writeln!(out, "#\tValue")?;
        for (k, v) in owned.iter().enumerate() {
            writeln!(out, "{}\t{:?}", first + k, v)?;
        }
        Ok(())
    }

    /// Collective: rank 0 writes every entry, one `index<TAB>value` line
    /// each. Other ranks write nothing.
    pub fn print_global<W: Write>(&self, out: &mut W) -> Result<(), VectorError> {
        let Some(all) = self.localize_to_one(0)? else {
            return Ok(());
        };
        writeln!(out, "Size\tglobal =  {}", all.len())?;
        writeln!(out, "#\tValue")?;
        for (i, v) in all.iter().enumerate() {
            writeln!(out, "{i}\t{v:?}")?;
        }
        Ok(())
    }

    /// Collective: rank 0 writes the vector as a Matlab column vector
    /// assignment `name = [ ... ];`. Other ranks write nothing.
    pub fn write_matlab<W: Write>(&self, name: &str, out: &mut W) -> Result<(), VectorError> {
        let Some(all) = self.localize_to_one(0)? else {
            return Ok(());
        };
        writeln!(out, "%Vec {name}, {} entries", all.len())?;
        writeln!(out, "{name} = [")?;
        for v in &all {
            writeln!(out, "{v:?};")?;
        }
        writeln!(out, "];")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::partition::ParallelType;

    fn sample() -> Vector<f64, NoComm> {
        let mut v = Vector::with_size(NoComm, 2, 2, ParallelType::Serial).unwrap();
        v.assign_from_slice(&[1.5, -2.0]).unwrap();
        v.close().unwrap();
        v
    }

    #[test]
    fn local_dump_lists_owned_entries() {
        let mut buf = Vec::new();
        sample().print_local(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "Size\tglobal =  2\t\tlocal =  2\n#\tValue\n0\t1.5\n1\t-2.0\n"
        );
    }

    #[test]
    fn matlab_dump() {
        let mut buf = Vec::new();
        sample().write_matlab("x", &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("x = [\n1.5;\n-2.0;\n];\n"));
    }
}
