use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use csv::StringRecord;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

lazy_static! {
    pub static ref ADDRESS_HEADERS: StringRecord = StringRecord::from(vec!["address"]);
}

const FILE_STEM: &str = "cvs-store-locations";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AddressRecord {
    pub address: String,
}

/// Where the date goes in the output file name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FileNaming {
    /// cvs-store-locations-<date>.csv
    #[default]
    DateSuffix,
    /// <date>_cvs-store-locations.csv
    DatePrefix,
}

impl FileNaming {
    pub fn file_name(&self, date: NaiveDate) -> String {
        let date = date.format("%Y-%m-%d");
        match self {
            Self::DateSuffix => format!("{FILE_STEM}-{date}.csv"),
            Self::DatePrefix => format!("{date}_{FILE_STEM}.csv"),
        }
    }
}

/// Cloneable handle sending records to the csv writer thread.
#[derive(Debug, Clone)]
pub struct RecordSink {
    tx_record: Sender<AddressRecord>,
}

impl RecordSink {
    pub fn send(&self, record: AddressRecord) {
        if let Err(e) = self.tx_record.send(record) {
            log::error!("Couldn't send record to the csv writer: {e}");
        }
    }
}

/// Csv file owned by a single writer thread.
///
/// The `address` header is written and flushed on creation, so the file
/// holds it even when no store is found.
pub struct CsvOutput {
    path: PathBuf,
    sink: RecordSink,
    tx_stop: Sender<()>,
    rx_done: Receiver<Result<usize>>,
}

impl CsvOutput {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs_err::File::create(&path)
            .with_context(|| format!("Cannot create file {}", path.display()))?;

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        wtr.write_record(ADDRESS_HEADERS.iter())?;
        wtr.flush()?;

        let (tx_record, rx_record) = unbounded::<AddressRecord>();
        let (tx_stop, rx_stop) = bounded::<()>(1);
        let (tx_done, rx_done) = bounded::<Result<usize>>(1);

        thread::Builder::new()
            .name("csv-writer".into())
            .spawn(move || {
                let mut written = 0;
                let mut write = |record: AddressRecord| match wtr.serialize(&record) {
                    Ok(()) => written += 1,
                    Err(e) => log::error!("Couldn't write record {record:?}: {e}"),
                };
                loop {
                    select! {
                        recv(rx_record) -> msg => match msg {
                            Ok(record) => write(record),
                            Err(_) => break,
                        },
                        recv(rx_stop) -> _ => {
                            // Drain what was sent before the stop
                            rx_record.try_iter().for_each(&mut write);
                            break;
                        }
                    }
                }
                let res = wtr.flush().map(|()| written).map_err(anyhow::Error::from);
                tx_done.send(res).ok();
            })?;

        Ok(Self {
            path,
            sink: RecordSink { tx_record },
            tx_stop,
            rx_done,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sink(&self) -> RecordSink {
        self.sink.clone()
    }

    /// Stops the writer and returns the number of records written.
    pub fn finish(self) -> Result<usize> {
        self.tx_stop.send(()).ok();
        self.rx_done
            .recv()
            .map_err(|_| anyhow!("Csv writer stopped unexpectedly"))?
            .with_context(|| format!("Couldn't flush {}", self.path.display()))
    }
}
