//! Retrieval through the MARS client.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use strum_macros::{EnumString, IntoStaticStr};
use tracing::info;

use super::{RetrievalBackend, Request};
use crate::{category::Category, config::ExtractDtSection, errors::DtExtractErr, exec};

/// The action at the top of a MARS request file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, IntoStaticStr)]
pub enum MarsVerb {
    /// Fetch from the archive.
    #[strum(to_string = "retrieve")]
    Retrieve,
    /// Read from local files.
    #[strum(to_string = "read")]
    Read,
}

/// Write `request` as a MARS request file.
///
/// The verb comes first, then one `  KEY = value` line per field. Every line but the last ends in
/// a comma.
pub fn write_mars_request(
    request: &Request,
    path: &dyn AsRef<Path>,
    verb: MarsVerb,
) -> Result<(), DtExtractErr> {
    let mut out = BufWriter::new(File::create(path.as_ref())?);

    let verb: &'static str = verb.into();
    write!(out, "{},", verb.to_uppercase())?;

    for (i, (key, value)) in request.iter().enumerate() {
        if i > 0 {
            write!(out, ",")?;
        }
        write!(out, "\n  {} = {}", key.to_uppercase(), value)?;
    }
    writeln!(out)?;

    out.flush()?;
    Ok(())
}

/// Fetches data by writing a request file and running the `mars` binary on it.
#[derive(Clone, Debug)]
pub struct MarsBackend {
    mars_bin: String,
    wrapper: Option<String>,
}

impl MarsBackend {
    /// Use the binary and wrapper from the configuration.
    pub fn new(section: &ExtractDtSection) -> Self {
        MarsBackend {
            mars_bin: section.mars_bin.clone(),
            wrapper: section.wrapper.clone(),
        }
    }
}

impl RetrievalBackend for MarsBackend {
    fn retrieve(
        &self,
        request: &Request,
        category: Category,
        workdir: &Path,
    ) -> Result<(), DtExtractErr> {
        info!("MARS REQUEST: {}", request);

        let req_file = format!("{}.req", category.tag());
        write_mars_request(request, &workdir.join(&req_file), MarsVerb::Retrieve)?;

        let mut cmd = exec::command_with_wrapper(self.wrapper.as_deref(), &self.mars_bin);
        cmd.arg(&req_file).current_dir(workdir);

        exec::run(&mut cmd)
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;

    use tempdir::TempDir;

    #[test]
    fn test_write_request() {
        let tmp = TempDir::new("dt-extract-mars").unwrap();
        let path = tmp.path().join("sfc.req");

        let mut request = Request::new();
        request.set("a", "1");
        request.set("b", "2");
        write_mars_request(&request, &path, MarsVerb::Retrieve).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "RETRIEVE,\n  A = 1,\n  B = 2\n"
        );

        let mut request = Request::new();
        request.set("target", "\"ua_[STEP].grib1\"");
        write_mars_request(&request, &path, MarsVerb::Read).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "READ,\n  TARGET = \"ua_[STEP].grib1\"\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_binary() {
        let tmp = TempDir::new("dt-extract-mars").unwrap();

        let mut request = Request::new();
        request.set("type", "FC");

        let backend = MarsBackend {
            mars_bin: "false".to_owned(),
            wrapper: None,
        };
        let result = backend.retrieve(&request, Category::Surface, tmp.path());

        assert!(matches!(result, Err(DtExtractErr::CommandFailed { .. })));
        // The request file is written before the client runs.
        assert!(tmp.path().join("sfc.req").is_file());
    }
}
