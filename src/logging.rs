use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

pub type LogFile = Arc<Mutex<BufWriter<File>>>;

/// `<dir>/<prefix>_%Y%m%d_%H%M%S.log`
pub fn open_log_file<P: AsRef<Path>>(dir: P, prefix: &str) -> Result<(LogFile, PathBuf)> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{}_{}.log", prefix, ts));
    let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    eprintln!("Log: {}", path.display());
    Ok((Arc::new(Mutex::new(BufWriter::new(file))), path))
}

/// stderr + log file, flushed per line
#[macro_export]
macro_rules! log {
    ($logfile:expr, $($arg:tt)*) => {{
        use ::std::io::Write as _;
        let msg = format!($($arg)*);
        eprintln!("{}", msg);
        if let Ok(mut f) = $logfile.lock() {
            let _ = writeln!(f, "{}", msg);
            let _ = f.flush();
        }
    }};
}
