//! # Progress 模块
//!
//! 读者阅读进度相关的纯函数：下一集选择与可观看剧集。
//!
//! 进度记录由外部持久层提供，按最近观看时间倒序排列。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::{Oice, OiceId, Story};

/// 单个剧集的阅读进度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadProgress {
    pub oice_id: OiceId,
    /// 是否已读完
    pub is_finished: bool,
}

/// 剧集是否可观看
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeAvailability {
    pub oice_id: OiceId,
    pub viewable: bool,
}

/// 选择读者接下来要读的剧集
///
/// 1. 第一个未读完的已发布剧集
/// 2. 全部读完时，返回最近读完的剧集，除非它是故事的最后一集
/// 3. 否则返回故事的第一集
///
/// `progress` 按最近观看时间倒序排列。没有任何剧集时返回 `None`。
pub fn next_episode_to_read<'a>(story: &'a Story, progress: &[ReadProgress]) -> Option<&'a Oice> {
    let mut finished = progress.iter().filter(|p| p.is_finished).peekable();
    let finished_ids: HashSet<OiceId> = finished.clone().map(|p| p.oice_id).collect();

    if let Some(oice) = story
        .published_oices()
        .find(|o| !finished_ids.contains(&o.id))
    {
        return Some(oice);
    }

    let last_viewed = story.oice(finished.peek()?.oice_id)?;
    if last_viewed.order != story.oices.len() - 1 {
        Some(last_viewed)
    } else {
        story.oices.first()
    }
}

/// 计算每个已发布剧集是否可观看
///
/// 有进度的剧集都可观看；当所有开始过的剧集都已读完时，
/// 下一个没有进度的剧集也可观看。未登录（`None`）时全部不可观看。
pub fn viewable_episodes(
    story: &Story,
    progress: Option<&[ReadProgress]>,
) -> Vec<EpisodeAvailability> {
    let mut viewable: HashSet<OiceId> = HashSet::new();

    if let Some(progress) = progress {
        let mut finished = HashSet::new();
        for p in progress {
            viewable.insert(p.oice_id);
            if p.is_finished {
                finished.insert(p.oice_id);
            }
        }

        // 读完了已开始的剧集，还没开始下一集
        if viewable.is_subset(&finished) {
            let next = story
                .published_oices()
                .find(|o| !viewable.contains(&o.id))
                .map(|o| o.id);
            if let Some(next) = next {
                viewable.insert(next);
            }
        }
    }

    story
        .published_oices()
        .map(|o| EpisodeAvailability {
            oice_id: o.id,
            viewable: viewable.contains(&o.id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(published: &[bool]) -> Story {
        Story {
            id: 1,
            language: "en".to_string(),
            oices: published
                .iter()
                .enumerate()
                .map(|(order, published)| Oice {
                    id: order as OiceId + 10,
                    filename: format!("ep{order}"),
                    order,
                    published: *published,
                    blocks: Vec::new(),
                })
                .collect(),
        }
    }

    fn finished(ids: &[OiceId]) -> Vec<ReadProgress> {
        ids.iter()
            .map(|&oice_id| ReadProgress {
                oice_id,
                is_finished: true,
            })
            .collect()
    }

    #[test]
    fn test_next_episode_first_unfinished() {
        let story = story(&[true, true, true]);
        let next = next_episode_to_read(&story, &finished(&[10])).unwrap();
        assert_eq!(next.id, 11);

        let next = next_episode_to_read(&story, &[]).unwrap();
        assert_eq!(next.id, 10);
    }

    #[test]
    fn test_next_episode_skips_unpublished() {
        let story = story(&[true, false, true]);
        let next = next_episode_to_read(&story, &finished(&[10])).unwrap();
        assert_eq!(next.id, 12);
    }

    #[test]
    fn test_all_finished_returns_last_viewed_unless_final() {
        let story = story(&[true, true, true]);

        // 最近读完的是第 2 集（不是最后一集）
        let next = next_episode_to_read(&story, &finished(&[11, 12, 10])).unwrap();
        assert_eq!(next.id, 11);

        // 最近读完的是最后一集，回到第一集
        let next = next_episode_to_read(&story, &finished(&[12, 11, 10])).unwrap();
        assert_eq!(next.id, 10);
    }

    #[test]
    fn test_all_finished_tie_uses_first_progress_entry() {
        // 同一剧集出现多次时只看第一条记录。
        // 最后一集按全部剧集计算，包括未发布的剧集。
        let story = story(&[true, true, false]);
        let next = next_episode_to_read(&story, &finished(&[11, 10, 11])).unwrap();
        assert_eq!(next.id, 11);
    }

    #[test]
    fn test_next_episode_empty_story() {
        let story = story(&[]);
        assert!(next_episode_to_read(&story, &[]).is_none());
    }

    #[test]
    fn test_viewable_episodes_adds_next_when_all_started_finished() {
        let story = story(&[true, true, true]);
        let result = viewable_episodes(&story, Some(&finished(&[10])));
        let viewable: Vec<_> = result.iter().map(|a| a.viewable).collect();
        assert_eq!(viewable, vec![true, true, false]);
    }

    #[test]
    fn test_viewable_episodes_in_progress() {
        let story = story(&[true, true, true]);
        let progress = [ReadProgress {
            oice_id: 10,
            is_finished: false,
        }];
        let result = viewable_episodes(&story, Some(&progress));
        let viewable: Vec<_> = result.iter().map(|a| a.viewable).collect();
        assert_eq!(viewable, vec![true, false, false]);
    }

    #[test]
    fn test_viewable_episodes_without_user() {
        let story = story(&[true, true]);
        assert!(viewable_episodes(&story, None).iter().all(|a| !a.viewable));

        // 登录但没有进度：第一集可观看
        let result = viewable_episodes(&story, Some(&[]));
        assert!(result[0].viewable);
        assert!(!result[1].viewable);
    }
}
