// The master store: one workbook + one metadata record on local disk.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use voc_insights::{Channel, InquiryRecord};

use crate::voc::{io_xlsx, normalize, IoSnafu, ParsingMetaSnafu, VocResult, WritingMasterSnafu};

pub const MASTER_FILE: &str = "master.xlsx";
pub const META_FILE: &str = "master.meta";
pub const MASTER_SHEET: &str = "master";

/// The canonical columns of the persisted master sheet, in order.
pub const MASTER_COLUMNS: [&str; 6] = ["date", "company", "major", "mid", "minor", "channel"];

/// The update metadata written alongside the master table on every save.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MasterMeta {
    pub updated_at: String,
    pub rows: u64,
    pub save_seconds: f64,
}

/// The persisted master table.
///
/// Single writer, last write wins, no rollback on interruption. The
/// loaded table is cached in-process; `save` and `reset` invalidate the
/// cache synchronously so the next read observes the new state.
pub struct MasterStore {
    data_dir: PathBuf,
    cache: RefCell<Option<Vec<InquiryRecord>>>,
}

impl MasterStore {
    pub fn new(data_dir: &Path) -> MasterStore {
        MasterStore {
            data_dir: data_dir.to_path_buf(),
            cache: RefCell::new(None),
        }
    }

    pub fn master_path(&self) -> PathBuf {
        self.data_dir.join(MASTER_FILE)
    }

    fn meta_path(&self) -> PathBuf {
        self.data_dir.join(META_FILE)
    }

    /// Writes the master workbook and its metadata record, replacing any
    /// prior content, and refreshes the read cache.
    ///
    /// The workbook holds the `master` sheet with the canonical columns,
    /// plus one audit sheet per non-empty channel.
    pub fn save(&self, records: &[InquiryRecord], meta: &MasterMeta) -> VocResult<PathBuf> {
        fs::create_dir_all(&self.data_dir).context(IoSnafu {
            path: self.data_dir.display().to_string(),
        })?;
        let path = self.master_path();

        let mut workbook = Workbook::new();
        write_sheet(workbook.add_worksheet(), MASTER_SHEET, records).context(
            WritingMasterSnafu {
                path: path.display().to_string(),
            },
        )?;
        for &ch in Channel::ALL.iter() {
            let subset: Vec<InquiryRecord> = records
                .iter()
                .filter(|r| r.channel == ch)
                .cloned()
                .collect();
            if subset.is_empty() {
                continue;
            }
            write_sheet(workbook.add_worksheet(), ch.label(), &subset).context(
                WritingMasterSnafu {
                    path: path.display().to_string(),
                },
            )?;
        }
        workbook.save(&path).context(WritingMasterSnafu {
            path: path.display().to_string(),
        })?;

        let meta_js = serde_json::to_string_pretty(meta).context(ParsingMetaSnafu {})?;
        fs::write(self.meta_path(), meta_js).context(IoSnafu {
            path: self.meta_path().display().to_string(),
        })?;

        // Read-after-write consistency for the single writer.
        self.cache.replace(Some(records.to_vec()));
        info!("save: wrote {} rows to {}", records.len(), path.display());
        Ok(path)
    }

    /// Loads the persisted table, or None if nothing has been saved.
    ///
    /// The table goes through the normalizer on read, so a master written
    /// by an older build with aliased headers still resolves.
    pub fn load_table(&self) -> VocResult<Option<Vec<InquiryRecord>>> {
        if let Some(cached) = self.cache.borrow().as_ref() {
            debug!("load_table: serving {} cached rows", cached.len());
            return Ok(Some(cached.clone()));
        }
        let path = self.master_path();
        if !path.exists() {
            return Ok(None);
        }
        let table = io_xlsx::read_sheet_table(&path, MASTER_SHEET)?;
        let records = normalize::normalize_master(&table)?;
        self.cache.replace(Some(records.clone()));
        Ok(Some(records))
    }

    /// Reads the metadata record; absent or unreadable reads as None.
    pub fn load_meta(&self) -> VocResult<Option<MasterMeta>> {
        let path = self.meta_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).context(IoSnafu {
            path: path.display().to_string(),
        })?;
        match serde_json::from_str::<MasterMeta>(&contents) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                warn!("load_meta: unreadable metadata record: {}", e);
                Ok(None)
            }
        }
    }

    pub fn load_updated_at(&self) -> VocResult<Option<String>> {
        Ok(self.load_meta()?.map(|m| m.updated_at))
    }

    /// Deletes the master table and metadata and invalidates the cache,
    /// so subsequent reads observe "no data" immediately.
    pub fn reset(&self) -> VocResult<()> {
        for path in [self.master_path(), self.meta_path()] {
            if path.exists() {
                fs::remove_file(&path).context(IoSnafu {
                    path: path.display().to_string(),
                })?;
            }
        }
        self.cache.replace(None);
        info!("reset: cleared master table and metadata");
        Ok(())
    }
}

fn write_sheet(
    sheet: &mut Worksheet,
    name: &str,
    records: &[InquiryRecord],
) -> Result<(), XlsxError> {
    sheet.set_name(name)?;
    for (col, header) in MASTER_COLUMNS.iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }
    for (idx, rec) in records.iter().enumerate() {
        let row = (idx + 1) as u32;
        let blank = String::new();
        let cells: [&String; 4] = [
            rec.company.as_ref().unwrap_or(&blank),
            rec.category_major.as_ref().unwrap_or(&blank),
            rec.category_mid.as_ref().unwrap_or(&blank),
            rec.category_minor.as_ref().unwrap_or(&blank),
        ];
        sheet.write_string(row, 0, rec.date.format("%Y-%m-%d %H:%M:%S").to_string())?;
        for (i, cell) in cells.iter().enumerate() {
            sheet.write_string(row, (i + 1) as u16, cell.as_str())?;
        }
        sheet.write_string(row, 5, rec.channel.label())?;
    }
    Ok(())
}
