//! Forward/backward cursor pagination over a view.
//!
//! A cursor names a row position `(key, id)` plus the direction it was
//! captured under; callers treat it as opaque and hand it back to resume.
//! Filters drop rows after fetching, so a page may require scanning more
//! than `page_size` rows; the fetch ceiling bounds that work and a page
//! cut short by the ceiling still carries a resume cursor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::key;
use crate::store::{DocStore, ViewQuery, ViewRow};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    key: Value,
    id: String,
    descending: bool,
}

impl Cursor {
    fn at_row(row: &ViewRow, descending: bool) -> Self {
        Self {
            key: row.key.clone(),
            id: row.id.clone(),
            descending,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageCursors {
    pub start: Option<Cursor>,
    pub end: Option<Cursor>,
    pub previous: Option<Cursor>,
    pub next: Option<Cursor>,
}

#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursors: PageCursors,
    pub total_size: Option<u64>,
}

impl<T> Page<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            cursors: PageCursors::default(),
            total_size: None,
        }
    }

    /// End of iteration: no items and nothing further to scan.
    pub fn is_end(&self) -> bool {
        self.items.is_empty() && self.cursors.next.is_none()
    }
}

type RowFilter<'s> = Box<dyn Fn(&ViewRow) -> bool + 's>;
type RowTransform<'s, T> = Box<dyn Fn(ViewRow) -> Result<T, StoreError> + 's>;

pub struct Pager<'s, T> {
    store: &'s dyn DocStore,
    view: &'static str,
    page_size: usize,
    fetch_ceiling: usize,
    descending: bool,
    include_docs: bool,
    start_key: Option<Value>,
    end_key: Option<Value>,
    filter: Option<RowFilter<'s>>,
    transform: RowTransform<'s, T>,
}

impl<'s> Pager<'s, ViewRow> {
    pub fn rows(store: &'s dyn DocStore, view: &'static str, page_size: usize) -> Self {
        Pager::new(store, view, page_size, Box::new(Ok))
    }
}

impl<'s, T> Pager<'s, T> {
    pub fn new(
        store: &'s dyn DocStore,
        view: &'static str,
        page_size: usize,
        transform: RowTransform<'s, T>,
    ) -> Self {
        Self {
            store,
            view,
            page_size: page_size.max(1),
            fetch_ceiling: page_size.max(1) * 10,
            descending: false,
            include_docs: false,
            start_key: None,
            end_key: None,
            filter: None,
            transform,
        }
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn with_docs(mut self) -> Self {
        self.include_docs = true;
        self
    }

    /// Range bounds in display order: `start` is where iteration begins,
    /// which for a descending pager is the high end.
    pub fn range(mut self, start: Option<Value>, end: Option<Value>) -> Self {
        self.start_key = start;
        self.end_key = end;
        self
    }

    pub fn filter(mut self, filter: impl Fn(&ViewRow) -> bool + 's) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn fetch_ceiling(mut self, ceiling: usize) -> Self {
        self.fetch_ceiling = ceiling.max(self.page_size);
        self
    }

    /// Page starting at `cursor` (inclusive), or the first page.
    pub fn at(&self, cursor: Option<&Cursor>) -> Result<Page<T>, StoreError> {
        let descending = cursor.map(|c| c.descending).unwrap_or(self.descending);
        let scanned = self.scan(
            cursor.map(|c| (&c.key, c.id.as_str())),
            true,
            descending,
            false,
            self.page_size,
        )?;
        self.build_page(scanned, descending, false)
    }

    /// Page after `cursor` (exclusive).
    pub fn next(&self, cursor: &Cursor) -> Result<Page<T>, StoreError> {
        let scanned = self.scan(
            Some((&cursor.key, cursor.id.as_str())),
            false,
            cursor.descending,
            false,
            self.page_size,
        )?;
        self.build_page(scanned, cursor.descending, false)
    }

    /// Page before `cursor` (exclusive), in display order.
    pub fn previous(&self, cursor: &Cursor) -> Result<Page<T>, StoreError> {
        let scanned = self.scan(
            Some((&cursor.key, cursor.id.as_str())),
            false,
            cursor.descending,
            true,
            self.page_size,
        )?;
        self.build_page(scanned, cursor.descending, true)
    }

    fn build_page(
        &self,
        scanned: Scan,
        descending: bool,
        reverse: bool,
    ) -> Result<Page<T>, StoreError> {
        let Scan {
            mut rows,
            more,
            resume,
        } = scanned;
        if reverse {
            rows.reverse();
        }

        if rows.is_empty() {
            let mut page = Page::empty();
            // A ceiling-cut scan found nothing yet but is not done.
            if let Some((k, id)) = resume {
                let cursor = Cursor {
                    key: k,
                    id,
                    descending,
                };
                if reverse {
                    page.cursors.previous = Some(cursor);
                } else {
                    page.cursors.next = Some(cursor);
                }
            }
            return Ok(page);
        }

        let first = Cursor::at_row(&rows[0], descending);
        let last = Cursor::at_row(&rows[rows.len() - 1], descending);

        let next = if reverse {
            // The caller paged backwards, so the page it came from is next.
            Some(last.clone())
        } else if more {
            Some(match resume.clone() {
                Some((k, id)) => Cursor {
                    key: k,
                    id,
                    descending,
                },
                None => last.clone(),
            })
        } else {
            None
        };

        let previous = if reverse {
            if more {
                Some(match resume {
                    Some((k, id)) => Cursor {
                        key: k,
                        id,
                        descending,
                    },
                    None => first.clone(),
                })
            } else {
                None
            }
        } else {
            // Probe one row backwards to report previous honestly.
            let probe = self.scan(
                Some((&first.key, first.id.as_str())),
                false,
                descending,
                true,
                1,
            )?;
            if probe.rows.is_empty() {
                None
            } else {
                Some(first.clone())
            }
        };

        let items = rows
            .into_iter()
            .map(|row| (self.transform)(row))
            .collect::<Result<Vec<T>, StoreError>>()?;

        Ok(Page {
            items,
            cursors: PageCursors {
                start: Some(first),
                end: Some(last),
                previous,
                next,
            },
            total_size: None,
        })
    }

    /// Scans up to `want` filtered rows from a position. `reverse` flips
    /// the scan against the display direction (for previous-page reads).
    fn scan(
        &self,
        from: Option<(&Value, &str)>,
        inclusive: bool,
        descending: bool,
        reverse: bool,
        want: usize,
    ) -> Result<Scan, StoreError> {
        let scan_desc = descending ^ reverse;

        // Absolute low/high bounds of the configured range, then oriented
        // for the direction this scan actually runs in.
        let (abs_low, abs_high) = if self.descending {
            (&self.end_key, &self.start_key)
        } else {
            (&self.start_key, &self.end_key)
        };
        let (scan_start, scan_end) = if scan_desc {
            (abs_high, abs_low)
        } else {
            (abs_low, abs_high)
        };

        // Current position: encoded key + id for comparison, raw key for
        // restarting the range query. Rows at the position itself are
        // excluded once anything has been examined.
        let mut pos: Option<(Vec<u8>, String, Value)> =
            from.map(|(k, id)| (key::encode(k), id.to_string(), k.clone()));
        let mut exclude_equal = !inclusive;

        let mut collected: Vec<ViewRow> = Vec::new();
        let mut fetched = 0usize;
        let mut chunk = (want + 1).max(32);
        let mut more = false;
        let mut ceiling_hit = false;
        let mut advanced = false;

        'outer: loop {
            let start_key = pos
                .as_ref()
                .map(|(_, _, raw)| raw.clone())
                .or_else(|| scan_start.clone());
            let query = ViewQuery {
                start_key,
                end_key: scan_end.clone(),
                keys: None,
                include_docs: self.include_docs,
                descending: scan_desc,
                limit: Some(chunk),
                reduce: false,
                group: false,
            };

            let batch = self.store.query(self.view, &query)?;
            let batch_len = batch.len();
            fetched += batch_len;

            let mut progressed = false;
            for row in batch {
                let row_enc = key::encode(&row.key);
                if let Some((pos_enc, pos_id, _)) = &pos {
                    let ord = (row_enc.as_slice(), row.id.as_str())
                        .cmp(&(pos_enc.as_slice(), pos_id.as_str()));
                    let behind = if scan_desc {
                        ord == std::cmp::Ordering::Greater
                    } else {
                        ord == std::cmp::Ordering::Less
                    };
                    if behind || (exclude_equal && ord == std::cmp::Ordering::Equal) {
                        continue;
                    }
                }

                progressed = true;
                advanced = true;
                pos = Some((row_enc, row.id.clone(), row.key.clone()));
                exclude_equal = true;

                if self.filter.as_ref().map(|f| f(&row)).unwrap_or(true) {
                    collected.push(row);
                    if collected.len() > want {
                        more = true;
                        break 'outer;
                    }
                }
            }

            if batch_len < chunk {
                break; // view exhausted
            }
            if fetched >= self.fetch_ceiling {
                ceiling_hit = true;
                break;
            }
            if !progressed {
                // Every row in the batch was already behind the position;
                // widen the window so the next query makes headway.
                chunk *= 2;
            }
        }

        let resume = if more {
            // The lookahead row is dropped below; resume at the last
            // delivered row instead.
            None
        } else if ceiling_hit && advanced {
            more = true;
            pos.map(|(_, id, raw)| (raw, id))
        } else {
            None
        };
        collected.truncate(want);

        Ok(Scan {
            rows: collected,
            more,
            resume,
        })
    }
}

struct Scan {
    rows: Vec<ViewRow>,
    more: bool,
    /// Raw position to resume from when the scan was cut by the ceiling.
    resume: Option<(Value, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use crate::views::{self, catalog_views};
    use chrono::{Duration, Utc};
    use shoebox_core::types::{new_object_id, Doc, Image, Size};

    fn seeded_store(count: usize) -> SqliteStore {
        let store = SqliteStore::open_in_memory(catalog_views()).unwrap();
        let base = Utc::now();
        for i in 0..count {
            let created = base + Duration::milliseconds(i as i64);
            let img = Image {
                id: new_object_id(),
                original_id: String::new(),
                batch_id: String::new(),
                path: format!("/photos/{:03}.png", i),
                name: format!("{:03}.png", i),
                format: "PNG".into(),
                geometry: "8x8".into(),
                size: Size {
                    width: 8,
                    height: 8,
                },
                filesize: "1.0K".into(),
                checksum: None,
                created_at: created,
                updated_at: created,
                tags: Vec::new(),
                in_trash: false,
                metadata_raw: None,
            };
            store.put(&Doc::Image(img), None).unwrap();
        }
        store
    }

    fn names(page: &Page<ViewRow>) -> Vec<String> {
        page.items
            .iter()
            .map(|r| {
                r.doc
                    .as_ref()
                    .and_then(|d| d.as_image())
                    .unwrap()
                    .name
                    .clone()
            })
            .collect()
    }

    #[test]
    fn test_forward_paging_to_the_end() {
        let store = seeded_store(25);
        let pager = Pager::rows(&store, views::names::BY_CREATION_TIME, 10).with_docs();

        let first = pager.at(None).unwrap();
        assert_eq!(first.items.len(), 10);
        assert_eq!(names(&first)[0], "000.png");
        assert!(first.cursors.previous.is_none());
        assert!(first.cursors.next.is_some());

        let second = pager.next(first.cursors.next.as_ref().unwrap()).unwrap();
        assert_eq!(names(&second)[0], "010.png");
        assert!(second.cursors.previous.is_some());

        let third = pager.next(second.cursors.next.as_ref().unwrap()).unwrap();
        assert_eq!(third.items.len(), 5);
        assert!(third.cursors.next.is_none());

        // Paging past the end is empty and distinct from an error.
        let beyond = pager.next(third.cursors.end.as_ref().unwrap()).unwrap();
        assert!(beyond.items.is_empty());
        assert!(beyond.is_end());
    }

    #[test]
    fn test_previous_restores_the_prior_page() {
        let store = seeded_store(25);
        let pager = Pager::rows(&store, views::names::BY_CREATION_TIME, 10).with_docs();

        let first = pager.at(None).unwrap();
        let second = pager.next(first.cursors.next.as_ref().unwrap()).unwrap();
        let back = pager
            .previous(second.cursors.start.as_ref().unwrap())
            .unwrap();

        assert_eq!(names(&back), names(&first));
        assert!(back.cursors.previous.is_none());
        assert!(back.cursors.next.is_some());
    }

    #[test]
    fn test_descending_display_order() {
        let store = seeded_store(12);
        let pager = Pager::rows(&store, views::names::BY_CREATION_TIME, 5)
            .with_docs()
            .descending();

        let first = pager.at(None).unwrap();
        assert_eq!(names(&first)[0], "011.png");
        let second = pager.next(first.cursors.next.as_ref().unwrap()).unwrap();
        assert_eq!(names(&second)[0], "006.png");

        let back = pager
            .previous(second.cursors.start.as_ref().unwrap())
            .unwrap();
        assert_eq!(names(&back), names(&first));
    }

    #[test]
    fn test_filter_fills_page_from_wider_fetch() {
        let store = seeded_store(30);
        let pager = Pager::rows(&store, views::names::BY_CREATION_TIME, 5)
            .with_docs()
            .filter(|row| {
                let name = &row.doc.as_ref().and_then(|d| d.as_image()).unwrap().name;
                // keep even indices only
                name[..3].parse::<u32>().unwrap() % 2 == 0
            });

        let page = pager.at(None).unwrap();
        assert_eq!(
            names(&page),
            vec!["000.png", "002.png", "004.png", "006.png", "008.png"]
        );
        let next = pager.next(page.cursors.next.as_ref().unwrap()).unwrap();
        assert_eq!(names(&next)[0], "010.png");
    }

    #[test]
    fn test_fetch_ceiling_yields_honest_partial_page() {
        let store = seeded_store(64);
        let pager = Pager::rows(&store, views::names::BY_CREATION_TIME, 5)
            .with_docs()
            .fetch_ceiling(16)
            .filter(|_| false); // nothing ever matches

        let page = pager.at(None).unwrap();
        assert!(page.items.is_empty());
        // The ceiling stopped the scan mid-view; a resume cursor is offered.
        assert!(page.cursors.next.is_some());
        assert!(!page.is_end());
    }

    #[test]
    fn test_transform_maps_rows() {
        let store = seeded_store(4);
        let pager: Pager<'_, String> = Pager::new(
            &store,
            views::names::BY_CREATION_TIME,
            10,
            Box::new(|row: ViewRow| {
                Ok(row
                    .doc
                    .and_then(|d| d.into_image())
                    .map(|img| img.name)
                    .unwrap_or_default())
            }),
        )
        .with_docs();

        let page = pager.at(None).unwrap();
        let expected: Vec<String> = (0..4).map(|i| format!("{:03}.png", i)).collect();
        assert_eq!(page.items, expected);
    }

    #[test]
    fn test_range_bounds_respected() {
        let store = seeded_store(20);
        // Collect all keys first, then page over a sub-range.
        let all = store
            .query(views::names::BY_CREATION_TIME, &ViewQuery::default())
            .unwrap();
        let start = all[5].key.clone();
        let end = all[14].key.clone();

        let pager = Pager::rows(&store, views::names::BY_CREATION_TIME, 50)
            .with_docs()
            .range(Some(start), Some(end));
        let page = pager.at(None).unwrap();
        assert_eq!(page.items.len(), 10);
        assert_eq!(names(&page)[0], "005.png");
        assert_eq!(names(&page)[9], "014.png");
    }
}
