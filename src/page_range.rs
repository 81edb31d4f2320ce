use anyhow::{anyhow, bail, Result};

/// One comma-separated item of a page selection such as "1-3", "9-6" or "5-end"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRange {
    pub start: PageRef,
    pub end: Option<PageRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRef {
    Number(u32),
    End,
}

impl PageRef {
    fn resolve(self, total_pages: u32) -> u32 {
        match self {
            PageRef::Number(n) => n,
            PageRef::End => total_pages,
        }
    }
}

impl PageRange {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("Empty page range");
        }

        match s.split_once('-') {
            Some(("", _)) => Err(anyhow!("Invalid page range: {}", s)),
            Some((start, end)) => Ok(PageRange {
                start: parse_page_ref(start)?,
                end: Some(parse_page_ref(end)?),
            }),
            None => Ok(PageRange {
                start: parse_page_ref(s)?,
                end: None,
            }),
        }
    }

    /// 1-based page numbers covered by this range, in range order
    pub fn expand(&self, total_pages: u32) -> Result<Vec<u32>> {
        let start = self.start.resolve(total_pages);
        let end = self.end.map_or(start, |end| end.resolve(total_pages));

        for page in [start, end] {
            if page == 0 {
                bail!("Page numbers must be >= 1");
            }
            if page > total_pages {
                bail!("Page {} exceeds total pages {}", page, total_pages);
            }
        }

        Ok(if start <= end {
            (start..=end).collect()
        } else {
            (end..=start).rev().collect()
        })
    }
}

fn parse_page_ref(s: &str) -> Result<PageRef> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("end") {
        Ok(PageRef::End)
    } else {
        s.parse::<u32>()
            .map(PageRef::Number)
            .map_err(|_| anyhow!("Invalid page number: {}", s))
    }
}

/// Expand "1-5,10,15-end" into 1-based page numbers
pub fn expand_page_ranges(s: &str, total_pages: u32) -> Result<Vec<u32>> {
    let mut pages = Vec::new();
    for part in s.split(',') {
        pages.extend(PageRange::parse(part)?.expand(total_pages)?);
    }
    Ok(pages)
}

/// Expand a page selection into 0-based page positions
pub fn selection_positions(s: &str, total_pages: u32) -> Result<Vec<u32>> {
    Ok(expand_page_ranges(s, total_pages)?
        .into_iter()
        .map(|page| page - 1)
        .collect())
}
