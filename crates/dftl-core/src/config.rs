//! Device geometry and recognized configuration options (§3, §6).

use serde::{Deserialize, Serialize};

/// Fixed entry size for a cached mapping-table slot, in bytes: an LPN/PPN
/// pair, 8 bytes regardless of geometry.
pub const CMT_ENTRY_BYTES: u64 = 8;

fn default_global_mapping_entry_bytes() -> u32 {
    8
}

fn default_over_provisioning() -> f64 {
    1.28
}

fn default_gc_threshold_ratio() -> f64 {
    0.8
}

fn default_gc_low_threshold_ratio() -> f64 {
    0.7
}

/// Recognized configuration options (§6 "Configuration").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DftlConfig {
    pub n_channels_per_dev: u32,
    pub n_blocks_per_channel: u32,
    pub n_pages_per_block: u32,
    pub page_size: u32,
    #[serde(default = "default_sector_size")]
    pub sector_size: u32,

    pub max_cmt_bytes: u64,

    #[serde(default = "default_global_mapping_entry_bytes")]
    pub global_mapping_entry_bytes: u32,

    #[serde(default = "default_over_provisioning")]
    pub over_provisioning: f64,

    #[serde(default = "default_gc_threshold_ratio")]
    pub gc_threshold_ratio: f64,

    #[serde(default = "default_gc_low_threshold_ratio")]
    pub gc_low_threshold_ratio: f64,

    #[serde(default)]
    pub record_bad_victim_block: bool,

    /// Protected-segment fraction of the segmented-LRU CMT (§9).
    #[serde(default = "default_slru_protected_ratio")]
    pub slru_protected_ratio: f64,
}

fn default_sector_size() -> u32 {
    512
}

fn default_slru_protected_ratio() -> f64 {
    0.5
}

impl Default for DftlConfig {
    fn default() -> Self {
        Self {
            n_channels_per_dev: 8,
            n_blocks_per_channel: 64,
            n_pages_per_block: 64,
            page_size: 4096,
            sector_size: default_sector_size(),
            max_cmt_bytes: 64 * 1024,
            global_mapping_entry_bytes: default_global_mapping_entry_bytes(),
            over_provisioning: default_over_provisioning(),
            gc_threshold_ratio: default_gc_threshold_ratio(),
            gc_low_threshold_ratio: default_gc_low_threshold_ratio(),
            record_bad_victim_block: false,
            slru_protected_ratio: default_slru_protected_ratio(),
        }
    }
}

/// Geometry derived once at construction time (§3 "Geometry").
///
/// Watermarks are clamped here so the decider never has to re-derive them:
/// `high >= 1/OP`, `low >= 0.8/OP`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub page_size: u32,
    pub pages_per_block: u32,
    pub blocks_per_channel: u32,
    pub channels: u32,

    pub pages_per_channel: u64,
    pub blocks_per_device: u64,
    pub pages_per_device: u64,
    pub entries_per_translation_page: u64,
    pub total_translation_pages: u64,

    pub max_cmt_entries: u64,

    pub gc_high_watermark_blocks: u64,
    pub gc_low_watermark_blocks: u64,

    pub record_bad_victim_block: bool,
    pub slru_protected_ratio: f64,
}

impl Geometry {
    pub fn from_config(cfg: &DftlConfig, total_lpns: u64) -> Self {
        let pages_per_channel = cfg.n_pages_per_block as u64 * cfg.n_blocks_per_channel as u64;
        let blocks_per_device = cfg.n_blocks_per_channel as u64 * cfg.n_channels_per_dev as u64;
        let pages_per_device = pages_per_channel * cfg.n_channels_per_dev as u64;

        let entries_per_translation_page =
            (cfg.page_size as u64 / cfg.global_mapping_entry_bytes as u64).max(1);
        let total_translation_pages =
            (total_lpns + entries_per_translation_page - 1) / entries_per_translation_page;

        let max_cmt_entries = cfg.max_cmt_bytes / CMT_ENTRY_BYTES;

        let op = cfg.over_provisioning.max(1.0);
        let high_ratio = cfg.gc_threshold_ratio.max(1.0 / op);
        let low_ratio = cfg.gc_low_threshold_ratio.max(0.8 / op);

        Geometry {
            page_size: cfg.page_size,
            pages_per_block: cfg.n_pages_per_block,
            blocks_per_channel: cfg.n_blocks_per_channel,
            channels: cfg.n_channels_per_dev,
            pages_per_channel,
            blocks_per_device,
            pages_per_device,
            entries_per_translation_page,
            total_translation_pages,
            max_cmt_entries,
            gc_high_watermark_blocks: ((blocks_per_device as f64) * high_ratio) as u64,
            gc_low_watermark_blocks: ((blocks_per_device as f64) * low_ratio) as u64,
            record_bad_victim_block: cfg.record_bad_victim_block,
            slru_protected_ratio: cfg.slru_protected_ratio,
        }
    }

    pub fn m_vpn_of_lpn(&self, lpn: u64) -> u64 {
        lpn / self.entries_per_translation_page
    }

    pub fn channel_of_ppn(&self, ppn: u64) -> u32 {
        (ppn / self.pages_per_channel) as u32
    }

    pub fn pbn_of_ppn(&self, ppn: u64) -> u64 {
        ppn / self.pages_per_block as u64
    }
}
