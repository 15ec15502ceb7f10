//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Paging types shared by listing queries

use serde::{Deserialize, Serialize};

/// Page size used when a caller does not ask for one
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page a caller may request
pub const MAX_PAGE_SIZE: u32 = 100;

/// Zero-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pageable {
    /// Page index, starting at zero
    #[serde(default)]
    pub page: u32,

    /// Elements per page
    #[serde(default)]
    pub size: Option<u32>,
}

impl Pageable {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: Some(size),
        }
    }

    /// Resolve the requested size, substituting `default` for a missing or
    /// zero size and clamping to [`MAX_PAGE_SIZE`].
    pub fn size_or(&self, default: u32) -> u32 {
        match self.size {
            Some(0) | None => default.clamp(1, MAX_PAGE_SIZE),
            Some(size) => size.min(MAX_PAGE_SIZE),
        }
    }

    /// Number of rows to skip for this page at the given size
    pub fn offset(&self, size: u32) -> u64 {
        self.page as u64 * size as u64
    }
}

impl Default for Pageable {
    fn default() -> Self {
        Self {
            page: 0,
            size: Some(DEFAULT_PAGE_SIZE),
        }
    }
}

/// Metadata describing a returned page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageData {
    pub page: u32,
    /// Number of elements actually returned
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl PageData {
    pub fn new(page: u32, returned: usize, total_elements: u64, page_size: u32) -> Self {
        let page_size = page_size.max(1) as u64;
        Self {
            page,
            size: returned as u32,
            total_elements,
            total_pages: total_elements.div_ceil(page_size),
        }
    }
}
