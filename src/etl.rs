pub mod build_store;
pub mod parse_osm;

use std::path::Path;
use log::{info, error};

use crate::errors::Result;


/// One cached step of the import pipeline. `process` skips the step when its
/// output is already present in `dir`.
pub trait Etl {
    type Input;
    type Output;

    fn etl_name(&self) -> &str;

    fn is_cached(&self, dir: &Path) -> Result<bool>;
    fn clean(&self, dir: &Path) -> Result<()>;

    fn extract(&mut self, dir: &Path) -> Result<Self::Input>;
    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;
    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()>;

    fn process(&mut self, dir: &Path) -> Result<()> {
        info!(etl_name = self.etl_name(); "Starting ETL process");
        if self.is_cached(dir)? {
            info!(etl_name = self.etl_name(); "Using cached value");
            return Ok(());
        }

        // Leftovers of an interrupted run.
        self.clean(dir)?;

        info!(etl_name = self.etl_name(); "Extracting");
        let input = match self.extract(dir) {
            Ok(input) => input,
            Err(err) => {
                error!(etl_name = self.etl_name(), err = err.message.as_str(); "Extraction failed with error");
                return Err(err);
            },
        };

        info!(etl_name = self.etl_name(); "Transforming");
        let output = match self.transform(input) {
            Ok(output) => output,
            Err(err) => {
                error!(etl_name = self.etl_name(), err = err.message.as_str(); "Transformation failed with error");
                return Err(err);
            },
        };

        info!(etl_name = self.etl_name(); "Loading");
        if let Err(err) = self.load(dir, output) {
            error!(etl_name = self.etl_name(), err = err.message.as_str(); "Loading failed with error");
            return Err(err);
        }
        info!(etl_name = self.etl_name(); "Process finished");
        Ok(())
    }
}
