/*!
 * Translation cache under concurrent use
 */

use crate::common::create_temp_dir;
use texlate::translation::TranslationCache;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrentPuts_withDistinctKeys_shouldAllBeReadable() {
    let dir = create_temp_dir().unwrap();
    let cache = TranslationCache::open(&dir.path().join("cache.db")).unwrap();
    cache.create("doc").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..32 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            let key = TranslationCache::paragraph_key(&format!("paragraph {}", i));
            cache.put("doc", &key, &format!("translated {}", i)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for i in 0..32 {
        let key = TranslationCache::paragraph_key(&format!("paragraph {}", i));
        assert_eq!(cache.get("doc", &key).await.unwrap(), Some(format!("translated {}", i)));
    }
    assert_eq!(cache.repository().paragraph_count("doc").await.unwrap(), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_prune_interleavedWithWrites_shouldKeepActiveDocument() {
    let cache = TranslationCache::in_memory().unwrap();
    cache.create("active").await.unwrap();

    let writer = {
        let cache = cache.clone();
        tokio::spawn(async move {
            for i in 0..20 {
                let key = TranslationCache::paragraph_key(&i.to_string());
                cache.put("active", &key, "text").await?;
            }
            anyhow::Ok(())
        })
    };
    let pruner = {
        let cache = cache.clone();
        tokio::spawn(async move {
            for _ in 0..5 {
                cache.prune(30, 10).await?;
            }
            anyhow::Ok(())
        })
    };

    writer.await.unwrap().unwrap();
    pruner.await.unwrap().unwrap();

    assert!(cache.exists("active").await.unwrap());
    assert_eq!(cache.repository().paragraph_count("active").await.unwrap(), 20);
}

#[tokio::test]
async fn test_repeatedPut_shouldLeaveSingleEntry() {
    let cache = TranslationCache::in_memory().unwrap();
    cache.create("doc").await.unwrap();
    let key = TranslationCache::paragraph_key("hello");

    cache.put("doc", &key, "bonjour").await.unwrap();
    cache.put("doc", &key, "bonjour").await.unwrap();

    assert_eq!(cache.repository().paragraph_count("doc").await.unwrap(), 1);
    assert_eq!(cache.get("doc", &key).await.unwrap().as_deref(), Some("bonjour"));
}
