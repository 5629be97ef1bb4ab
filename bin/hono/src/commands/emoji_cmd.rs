use hono_core::Paths;
use hono_storage::Store;

use super::open_store;

pub async fn add(paths: &Paths, glyph: &str, document_id: i64, description: &str) -> anyhow::Result<()> {
    let store = open_store(paths)?;
    store.add_emoji(glyph, document_id, description).await?;
    let catalog = store.emoji_catalog().await?;
    let tag = catalog
        .iter()
        .position(|e| e.document_id == document_id)
        .map(|i| i + 1)
        .unwrap_or(catalog.len());
    println!("✓ #{} {} ({})", tag, glyph, document_id);
    Ok(())
}

pub async fn list(paths: &Paths) -> anyhow::Result<()> {
    let catalog = open_store(paths)?.emoji_catalog().await?;
    if catalog.is_empty() {
        println!("Emoji catalog is empty. Add one with `hono emoji add <glyph> <document_id>`.");
        return Ok(());
    }
    println!("{} custom emoji:", catalog.len());
    for (i, e) in catalog.iter().enumerate() {
        println!("  #{:<4} {}  {:<20} {}", i + 1, e.glyph, e.document_id, e.description);
    }
    Ok(())
}

pub async fn remove(paths: &Paths, document_id: i64) -> anyhow::Result<()> {
    if open_store(paths)?.remove_emoji(document_id).await? {
        println!("✓ Removed {}", document_id);
        Ok(())
    } else {
        anyhow::bail!("No emoji with document id {}", document_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());

        add(&paths, "\u{1F525}", 555, "fire").await.unwrap();
        add(&paths, "\u{2B50}", 777, "star").await.unwrap();
        list(&paths).await.unwrap();
        assert_eq!(open_store(&paths).unwrap().emoji_catalog().await.unwrap().len(), 2);

        remove(&paths, 555).await.unwrap();
        assert!(remove(&paths, 555).await.is_err());
        let left = open_store(&paths).unwrap().emoji_catalog().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].document_id, 777);
    }
}
