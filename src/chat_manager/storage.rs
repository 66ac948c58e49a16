use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::types::{GroupDefinition, GroupMember, Persona, Roster, WeightedKeyword};
use crate::error::AppError;
use crate::utils::log_info;

pub const DEFAULT_GROUP_ID: &str = "铁三角";

const SILENT_TEMPLATE: &str = "你是{{char.name}}。{{char.desc}}

{{rules}}
- 你极少说话，每次回复不超过二十个字
- 不使用表情符号，不解释自己的动机
- 必要时只用动作或一个字回应

{{scene}}

最近的对话：
{{history}}

对方刚刚说：{{user_message}}";

lazy_static::lazy_static! {
    static ref BUILTIN_ROSTER: Arc<Roster> = Arc::new(builtin_roster());
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn weighted(items: &[&str]) -> Vec<WeightedKeyword> {
    items.iter().map(|s| WeightedKeyword::new(s)).collect()
}

fn builtin_roster() -> Roster {
    let personas = vec![
        Persona {
            id: "吴邪".to_string(),
            description: "吴山居的小老板，好奇心重，心思细密，总想弄清楚每一件事背后的真相。".to_string(),
            prompt_template: None,
            max_reply_tokens: Some(400),
            aliases: words(&["吴邪", "天真", "小三爷", "老吴"]),
            score_keywords: weighted(&[
                "笔记", "三叔", "推理", "线索", "为什么", "古董", "铺子", "西泠印社", "谜", "历史",
            ]),
            selection_bias: 2,
            terse: false,
            fallback_replies: words(&["信号好像不太好，我等会儿再跟你说。"]),
        },
        Persona {
            id: "王胖子".to_string(),
            description: "北京潘家园出身的摸金校尉，嘴贫爱吃，讲义气，关键时刻靠得住。".to_string(),
            prompt_template: None,
            max_reply_tokens: Some(400),
            aliases: words(&["王胖子", "胖子", "胖爷", "胖哥"]),
            score_keywords: weighted(&[
                "吃", "喝", "钱", "明器", "宝贝", "北京", "潘家园", "饿", "酒", "玩笑", "云彩",
            ]),
            selection_bias: 3,
            terse: false,
            fallback_replies: words(&["胖爷我刚才走神了，你再说一遍？"]),
        },
        Persona {
            id: "张起灵".to_string(),
            description: "张家族长，身手极好，沉默寡言，记忆常常缺失。".to_string(),
            prompt_template: Some(SILENT_TEMPLATE.to_string()),
            max_reply_tokens: Some(60),
            aliases: words(&["张起灵", "小哥", "闷油瓶", "起灵", "族长"]),
            score_keywords: weighted(&[
                "危险", "青铜门", "长白山", "麒麟", "刀", "机关", "粽子", "失忆", "张家",
            ]),
            selection_bias: -5,
            terse: true,
            fallback_replies: words(&["……"]),
        },
        Persona {
            id: "黑瞎子".to_string(),
            description: "常年戴着墨镜的道上高手，爱财，说话吊儿郎当却从不失手。".to_string(),
            prompt_template: None,
            max_reply_tokens: Some(300),
            aliases: words(&["黑瞎子", "瞎子", "黑爷"]),
            score_keywords: weighted(&["墨镜", "钱", "解雨臣", "眼睛"]),
            selection_bias: 1,
            terse: false,
            fallback_replies: words(&["啧，这会儿不方便，回头聊。"]),
        },
    ];

    let groups = vec![GroupDefinition {
        id: DEFAULT_GROUP_ID.to_string(),
        scene: Some("杭州吴山居，三人刚从长白山回来，正在铺子里歇脚。".to_string()),
        members: vec![
            GroupMember::new("王胖子"),
            GroupMember::new("吴邪"),
            GroupMember {
                persona_id: "张起灵".to_string(),
                prompt_template: None,
                max_reply_tokens: Some(40),
            },
        ],
    }];

    let mut roster = Roster {
        personas,
        groups,
        topics: words(&[
            "青铜门", "长白山", "古墓", "粽子", "明器", "机关", "三叔", "笔记", "盗墓", "吃", "钱",
            "危险",
        ]),
        continuation_phrases: words(&[
            "然后呢", "然后", "接着", "继续", "后来呢", "还有呢", "真的吗", "是吗", "为什么",
            "怎么办", "所以呢", "嗯", "哦", "哈哈",
        ]),
    };
    roster.normalize_keywords();
    roster
}

/// The compiled-in roster shared by every caller.
pub fn default_roster() -> Arc<Roster> {
    BUILTIN_ROSTER.clone()
}

/// Load a roster from a JSON file, or the built-in one when no path is given.
/// Either way the roster is validated before it is handed out.
pub fn load_roster(path: Option<&Path>) -> Result<Arc<Roster>, AppError> {
    let roster = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)?;
            let mut roster: Roster = serde_json::from_str(&raw)?;
            roster.normalize_keywords();
            log_info(
                "roster",
                format!(
                    "loaded {} personas and {} groups from {}",
                    roster.personas.len(),
                    roster.groups.len(),
                    path.display()
                ),
            );
            Arc::new(roster)
        }
        None => default_roster(),
    };

    roster.validate()?;
    Ok(roster)
}
