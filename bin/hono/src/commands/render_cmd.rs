use hono_channels::{render, EmojiMap, FormattedText};
use hono_core::Paths;
use hono_storage::Store;

use super::open_store;

pub async fn run(paths: &Paths, text: &str) -> anyhow::Result<()> {
    let rendered = render_with_catalog(paths, text).await?;
    println!("{}", rendered.text);
    println!();
    println!("{}", serde_json::to_string_pretty(&rendered.spans)?);
    Ok(())
}

/// Renders against the stored emoji catalog; without a database every `#N` tag is dropped.
async fn render_with_catalog(paths: &Paths, text: &str) -> anyhow::Result<FormattedText> {
    let emoji = if paths.database_file().exists() {
        let catalog = open_store(paths)?.emoji_catalog().await?;
        EmojiMap::from_catalog(catalog.into_iter().map(|e| (e.document_id, e.glyph)))
    } else {
        EmojiMap::default()
    };
    Ok(render(text, &emoji))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hono_channels::SpanKind;

    #[tokio::test]
    async fn test_render_uses_stored_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());

        let bare = render_with_catalog(&paths, "**hey** #1").await.unwrap();
        assert_eq!(bare.text, "hey ");

        open_store(&paths)
            .unwrap()
            .add_emoji("\u{2B50}", 4242, "star")
            .await
            .unwrap();
        let rendered = render_with_catalog(&paths, "**hey** #1").await.unwrap();
        assert_eq!(rendered.text, "hey \u{2B50}");
        assert!(rendered
            .spans
            .iter()
            .any(|s| s.kind == SpanKind::CustomEmoji { document_id: 4242 }));
    }
}
