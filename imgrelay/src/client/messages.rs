//! User-visible strings for the upload client.

use serde::Deserialize;

/// Language of the messages the client stores for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Th,
}

impl Locale {
    pub fn no_file_selected(self) -> &'static str {
        match self {
            Locale::En => "Please select an image file",
            Locale::Th => "กรุณาเลือกไฟล์รูปภาพ",
        }
    }

    pub fn upload_in_flight(self) -> &'static str {
        match self {
            Locale::En => "An upload is already in progress",
            Locale::Th => "กำลังอัปโหลดอยู่ กรุณารอสักครู่",
        }
    }

    /// Shown when the image host rejected the file without saying why.
    pub fn upload_failed(self) -> &'static str {
        match self {
            Locale::En => "Upload failed",
            Locale::Th => "อัปโหลดไม่สำเร็จ",
        }
    }

    /// Shown when the relay could not be reached at all.
    pub fn upload_error(self) -> &'static str {
        match self {
            Locale::En => "An error occurred while uploading",
            Locale::Th => "เกิดข้อผิดพลาดในการอัปโหลด",
        }
    }

    pub fn relay_status(self, status: u16) -> String {
        match self {
            Locale::En => format!("Upload failed with HTTP status {status}"),
            Locale::Th => format!("อัปโหลดไม่สำเร็จ (HTTP {status})"),
        }
    }
}
