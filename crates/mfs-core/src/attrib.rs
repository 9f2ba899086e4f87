//! File attributes and directory listing.

use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use tracing::{debug, instrument};

use crate::error::{MfsError, Result};
use crate::image::Image;

/// Time format used in listings.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A toggleable inode flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Hidden,
    ReadOnly,
}

/// A parsed `+h`, `-h`, `+r` or `-r` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeChange {
    pub attribute: Attribute,
    pub enable: bool,
}

impl FromStr for AttributeChange {
    type Err = MfsError;

    fn from_str(token: &str) -> Result<Self> {
        let (attribute, enable) = match token {
            "+h" => (Attribute::Hidden, true),
            "-h" => (Attribute::Hidden, false),
            "+r" => (Attribute::ReadOnly, true),
            "-r" => (Attribute::ReadOnly, false),
            other => {
                return Err(MfsError::InvalidArgument(format!(
                    "unknown attribute '{}', expected one of +h -h +r -r",
                    other
                )))
            }
        };
        Ok(Self { attribute, enable })
    }
}

/// Which entries `list` reports and whether flags are included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub show_hidden: bool,
    pub show_attributes: bool,
}

/// Flags reported with `list -a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub hidden: bool,
    pub readonly: bool,
}

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    pub name: String,
    pub file_size: u32,
    pub creation_time: DateTime<Utc>,
    pub flags: Option<Flags>,
}

impl ListRow {
    /// Creation time in local time, formatted with [`TIME_FORMAT`].
    pub fn created(&self) -> String {
        format_time(&self.creation_time)
    }
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local).format(TIME_FORMAT).to_string()
}

impl Image {
    /// Set or clear a flag on an active file. Block allocation is untouched.
    #[instrument(skip(self))]
    pub fn set_attribute(&mut self, name: &str, attribute: Attribute, enable: bool) -> Result<()> {
        let (_, inode_index) = self.resolve(name)?;
        let inode = self.inodes.get_mut(inode_index)?;
        match attribute {
            Attribute::Hidden => inode.hidden = enable,
            Attribute::ReadOnly => inode.readonly = enable,
        }
        debug!(name, ?attribute, enable, "Attribute updated");
        Ok(())
    }

    /// Rows for every active entry, in directory slot order. Hidden files
    /// are skipped unless `show_hidden` is set. An empty result means there
    /// is nothing to show.
    pub fn list(&self, options: ListOptions) -> Result<Vec<ListRow>> {
        let mut rows = Vec::new();
        for (_, entry) in self.directory.active() {
            let Some(inode_index) = entry.inode else {
                continue;
            };
            let inode = self.inodes.get(inode_index)?;
            if inode.hidden && !options.show_hidden {
                continue;
            }
            rows.push(ListRow {
                name: entry.name.clone(),
                file_size: inode.file_size,
                creation_time: inode.creation_time,
                flags: options.show_attributes.then_some(Flags {
                    hidden: inode.hidden,
                    readonly: inode.readonly,
                }),
            });
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Geometry;
    use tempfile::TempDir;

    fn image_with(names: &[&str]) -> (TempDir, Image) {
        let temp = TempDir::new().unwrap();
        let mut image = Image::new(Geometry {
            num_blocks: 512,
            max_files: 8,
        })
        .unwrap();
        for name in names {
            let path = temp.path().join(name);
            std::fs::write(&path, name.as_bytes()).unwrap();
            image.insert(&path).unwrap();
        }
        (temp, image)
    }

    fn names(rows: &[ListRow]) -> Vec<&str> {
        rows.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_parse_attribute_tokens() {
        assert_eq!(
            "+h".parse::<AttributeChange>().unwrap(),
            AttributeChange {
                attribute: Attribute::Hidden,
                enable: true
            }
        );
        assert_eq!(
            "-r".parse::<AttributeChange>().unwrap(),
            AttributeChange {
                attribute: Attribute::ReadOnly,
                enable: false
            }
        );
        for bad in ["h", "+x", "++h", ""] {
            assert!(matches!(
                bad.parse::<AttributeChange>(),
                Err(MfsError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_hidden_files_are_filtered() {
        let (_temp, mut image) = image_with(&["a", "b", "c"]);
        image.set_attribute("b", Attribute::Hidden, true).unwrap();

        let visible = image.list(ListOptions::default()).unwrap();
        assert_eq!(names(&visible), vec!["a", "c"]);

        let all = image
            .list(ListOptions {
                show_hidden: true,
                show_attributes: false,
            })
            .unwrap();
        assert_eq!(names(&all), vec!["a", "b", "c"]);
        assert!(all.iter().all(|r| r.flags.is_none()));
    }

    #[test]
    fn test_list_reports_flags() {
        let (_temp, mut image) = image_with(&["a"]);
        image.set_attribute("a", Attribute::ReadOnly, true).unwrap();

        let rows = image
            .list(ListOptions {
                show_hidden: false,
                show_attributes: true,
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file_size, 1);
        assert_eq!(
            rows[0].flags,
            Some(Flags {
                hidden: false,
                readonly: true
            })
        );
    }

    #[test]
    fn test_empty_listing() {
        let (_temp, mut image) = image_with(&["only"]);
        assert!(image.list(ListOptions::default()).unwrap().len() == 1);
        image.delete("only").unwrap();
        assert!(image.list(ListOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_attribute_does_not_touch_allocation() {
        let (_temp, mut image) = image_with(&["f"]);
        let free = image.available();
        image.set_attribute("f", Attribute::Hidden, true).unwrap();
        image.set_attribute("f", Attribute::Hidden, false).unwrap();
        assert_eq!(image.available(), free);
        assert!(matches!(
            image.set_attribute("ghost", Attribute::ReadOnly, true),
            Err(MfsError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_created_uses_listing_format() {
        let (_temp, image) = image_with(&["t"]);
        let rows = image.list(ListOptions::default()).unwrap();
        let created = rows[0].created();
        assert_eq!(created.len(), "2024-01-01 00:00:00".len());
        assert_eq!(&created[4..5], "-");
        assert_eq!(&created[13..14], ":");
    }
}
