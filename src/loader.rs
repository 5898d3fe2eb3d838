/// One loadable section of an executable image: a run of contiguous virtual
/// pages, read-only or writable, backed by the image bytes.
pub struct Section<const PAGE_SIZE: usize> {
    first_vpn: u32,
    read_only: bool,
    data: Vec<u8>,
}

impl<const PAGE_SIZE: usize> Section<PAGE_SIZE> {
    pub fn new(first_vpn: u32, read_only: bool, data: Vec<u8>) -> Self {
        Self {
            first_vpn,
            read_only,
            data,
        }
    }

    pub fn first_vpn(&self) -> u32 {
        self.first_vpn
    }

    pub fn length_pages(&self) -> u32 {
        (self.data.len().div_ceil(PAGE_SIZE)) as u32
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn contains(&self, vpn: u32) -> bool {
        vpn >= self.first_vpn && vpn < self.first_vpn + self.length_pages()
    }

    /// Returns one page of section bytes, zero-padded past the end of the
    /// image data. `index` is relative to the section start.
    pub fn load_page(&self, index: u32) -> Box<[u8; PAGE_SIZE]> {
        assert!(
            index < self.length_pages(),
            "page {} is outside the section",
            index
        );
        let start = index as usize * PAGE_SIZE;
        let end = usize::min(start + PAGE_SIZE, self.data.len());
        let mut block = Box::new([0; PAGE_SIZE]);
        block[..end - start].copy_from_slice(&self.data[start..end]);
        block
    }
}

/// A demand-pageable executable image: the section table the loader exposes
/// to the paging engine. Nothing is copied anywhere at exec time; pages are
/// pulled out of the image one at a time as faults resolve.
pub struct Executable<const PAGE_SIZE: usize> {
    sections: Vec<Section<PAGE_SIZE>>,
}

impl<const PAGE_SIZE: usize> Executable<PAGE_SIZE> {
    pub fn new(sections: Vec<Section<PAGE_SIZE>>) -> Self {
        Self { sections }
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn section(&self, i: usize) -> &Section<PAGE_SIZE> {
        &self.sections[i]
    }

    pub fn section_of(&self, vpn: u32) -> Option<&Section<PAGE_SIZE>> {
        self.sections.iter().find(|s| s.contains(vpn))
    }

    pub fn code_pages(&self) -> u32 {
        self.sections.iter().map(|s| s.length_pages()).sum()
    }
}
