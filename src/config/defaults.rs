/// Rules for the HashCheck tree, in propagation order.
///
/// `appveyor.yml` goes last: its `version:` line records what the previous
/// run wrote, which is how an unchanged version is detected.
pub const BUILTIN_CONFIG: &str = r#"
[source]
file = "version.h"
symbol = "HASHCHECK_VERSION_STR"

[last_run]
file = "appveyor.yml"
pattern = '^version:\s*(\S+)\s*$'

[[targets]]
file = "version.h"

[[targets.rules]]
id = "version-full"
pattern = '^#define\s+HASHCHECK_VERSION_FULL\s+[\d,]+'
replace = '#define HASHCHECK_VERSION_FULL {{major}},{{minor}},{{patch}},{{build}}'

[[targets.rules]]
id = "version-str"
pattern = '^#define\s+HASHCHECK_VERSION_STR\s+"[\d.\w-]*"'
replace = '#define HASHCHECK_VERSION_STR "{{version}}"'

[[targets.rules]]
id = "linker-version"
pattern = '^#pragma\s+comment\s*\(\s*linker\s*,\s*"/version:[\d+.]+"\s*\)'
replace = '#pragma comment(linker, "/version:{{major}}.{{minor}}")'

[[targets]]
file = "installer/HashCheck.nsi"

[[targets.rules]]
id = "outfile"
pattern = '^OutFile\s*"HashCheckSetup-v[\d.\w-]+.exe"'
replace = 'OutFile "HashCheckSetup-v{{version}}.exe"'

[[targets.rules]]
id = "product-version"
pattern = '^VIProductVersion\s+"[\d.\w-]+"'
replace = 'VIProductVersion "{{version}}"'

[[targets.rules]]
id = "version-key-product"
pattern = '^VIAddVersionKey\s+/LANG=\$\{LANG_ENGLISH\}\s+"ProductVersion"\s+"[\d.\w-]+"'
replace = 'VIAddVersionKey /LANG=${LANG_ENGLISH} "ProductVersion" "{{version}}"'

[[targets.rules]]
id = "version-key-file"
pattern = 'VIAddVersionKey\s+/LANG=\$\{LANG_ENGLISH\}\s+"FileVersion"\s+"[\d.\w-]+"'
replace = 'VIAddVersionKey /LANG=${LANG_ENGLISH} "FileVersion" "{{version}}"'

[[targets]]
file = "appveyor.yml"

[[targets.rules]]
id = "ci-version"
pattern = '^version:\s*\S+'
replace = 'version: {{version}}'
"#;
