/// A scene whose location in the overdump is already known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownScene {
    pub offset: usize,
    pub name: &'static str,
    /// Door entry width in this scene; 0 means the standard 16 bytes.
    pub door_stride: usize,
}

const NARROW_DOORS: usize = 0x0e;

const fn scene(offset: usize, name: &'static str) -> KnownScene {
    KnownScene {
        offset,
        name,
        door_stride: 0,
    }
}

const fn narrow(offset: usize, name: &'static str) -> KnownScene {
    KnownScene {
        offset,
        name,
        door_stride: NARROW_DOORS,
    }
}

/// Scenes of the F-Zero X overdump, in extraction order. Each scene and its
/// rooms are zeroed in the dump once extracted, so later entries see the
/// ranges of earlier ones cleared.
pub const KNOWN_SCENES: &[KnownScene] = &[
    narrow(0x010F_A150, "fstdan"),
    scene(0x0116_BF80, "dodongo's cavern"),
    scene(0x011D_7CA0, "stalfos"),
    scene(0x011E_6860, "stalfos-1"),
    scene(0x011F_2C30, "test map with 3D ladders"),
    scene(0x0120_0B10, "prototype deku tree"),
    scene(0x0120_9B40, "gohma"),
    scene(0x0121_3480, "depth test"),
    scene(0x0125_EE70, "prerendered shop"),
    scene(0x0128_75B0, "newer hyrule field"),
    scene(0x012B_1C30, "kakariko"),
    scene(0x012D_2DF0, "graveyard"),
    scene(0x012E_8A70, "lost woods"),
    scene(0x0130_C490, "kokiri forest"),
    scene(0x0133_5A90, "sacred forest meadow"),
    scene(0x0133_CD40, "lake house"),
    scene(0x0135_6E50, "zora's river"),
    scene(0x0135_D420, "fishing pond"),
    scene(0x0136_6200, "gerudo valley"),
    scene(0x0138_EFC0, "hyrule castle exterior"),
    scene(0x013A_8AA0, "death mountain"),
    scene(0x013C_2D50, "death mountain crater"),
    scene(0x013E_4860, "cave with stalactites"),
    scene(0x013E_74B0, "cave"),
    scene(0x013F_4780, "prerendered market"),
    scene(0x013F_8FC0, "another prerendered market"),
    narrow(0x013F_C0C0, "fire temple"),
    narrow(0x0151_6950, "forest temple"),
    scene(0x0160_BB40, "horseback archery"),
    scene(0x0161_B1E0, "srd test"),
    scene(0x0162_25B0, "textureless scene"),
    scene(0x0162_4320, "test room treasure chests"),
    scene(0x0163_36C0, "deku tree"),
    scene(0x016A_A080, "jabu jabu test"),
    scene(0x016A_D480, "chamber of sages"),
    scene(0x016B_F4E0, "temple of time exterior"),
    scene(0x016C_36C0, "fountain"),
    scene(0x016D_0CC0, "temple of time"),
    scene(0x016E_1C10, "forest temple maze"),
    scene(0x016E_CFE0, "wood floor"),
    scene(0x016E_ED40, "forest temple room"),
    scene(0x016F_6BA0, "fire temple maze"),
    scene(0x0173_3F00, "kokiri prerender"),
    scene(0x0175_B4C0, "another kokiri prerender"),
    scene(0x0178_56A0, "draw order test"),
    scene(0x0178_9C10, "older hyrule field"),
    scene(0x017C_6920, "cave c"),
    narrow(0x017D_3120, "water temple"),
    scene(0x018C_2CA0, "prerendered area"),
    scene(0x018E_E2C0, "grotto"),
    scene(0x018F_9B10, "gerudo training grounds"),
    scene(0x0197_D860, "prerendered market entrance"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_offsets_are_unique_and_aligned() {
        assert_eq!(KNOWN_SCENES.len(), 52);
        let offsets: HashSet<_> = KNOWN_SCENES.iter().map(|scene| scene.offset).collect();
        assert_eq!(offsets.len(), KNOWN_SCENES.len());
        assert!(KNOWN_SCENES.iter().all(|scene| scene.offset % 16 == 0));
    }

    #[test]
    fn only_four_scenes_use_narrow_doors() {
        let narrow: Vec<_> = KNOWN_SCENES
            .iter()
            .filter(|scene| scene.door_stride != 0)
            .map(|scene| scene.name)
            .collect();
        assert_eq!(
            narrow,
            vec!["fstdan", "fire temple", "forest temple", "water temple"]
        );
    }
}
