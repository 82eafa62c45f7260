mod canonical_text;
