//! Builders for test articles and image fixtures.

#![allow(dead_code)]

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

/// Builds a Markdown article with a YAML frontmatter block.
pub struct ArticleBuilder {
    fields: Vec<(String, String)>,
    body: String,
    frontmatter: bool,
}

impl ArticleBuilder {
    /// An article titled `title` with a one-paragraph body.
    pub fn new(title: &str) -> Self {
        Self {
            fields: vec![("title".to_string(), title.to_string())],
            body: "# Heading\n\nThe first paragraph of the article.".to_string(),
            frontmatter: true,
        }
    }

    /// An article without any title field.
    pub fn untitled() -> Self {
        Self {
            fields: vec![],
            ..Self::new("")
        }
    }

    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.fields.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn without_frontmatter(mut self) -> Self {
        self.frontmatter = false;
        self
    }

    pub fn build(&self) -> String {
        let mut out = String::new();
        if self.frontmatter {
            out.push_str("---\n");
            for (key, value) in &self.fields {
                out.push_str(&format!("{}: {}\n", key, value));
            }
            out.push_str("---\n\n");
        }
        out.push_str(&self.body);
        out.push('\n');
        out
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.build().into_bytes()
    }
}

fn solid(shade: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([shade, 128, 255 - shade])))
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, format).unwrap();
    buffer.into_inner()
}

/// A small JPEG; different shades give different content digests.
pub fn jpeg_bytes(shade: u8) -> Vec<u8> {
    encode(&solid(shade), ImageFormat::Jpeg)
}

/// A small PNG; different shades give different content digests.
pub fn png_bytes(shade: u8) -> Vec<u8> {
    encode(&solid(shade), ImageFormat::Png)
}
